use tape_runtime::{command, Cmd, InputEvent, KeyCode, KeyEvent, Model, Modifiers, Msg, Program};

#[derive(Default)]
struct Suspender {
    resumed: usize,
    suspending: bool,
}

fn key(msg: &Msg) -> Option<&KeyEvent> {
    match msg.as_input() {
        Some(InputEvent::Key(key)) if !key.is_release() => Some(key),
        _ => None,
    }
}

impl Model for Suspender {
    fn update(&mut self, msg: Msg) -> Option<Cmd> {
        if matches!(msg, Msg::Resume) {
            self.resumed += 1;
            self.suspending = false;
            return None;
        }
        let key = key(&msg)?;
        let ctrl = key.modifiers.contains(Modifiers::CTRL);
        match key.code {
            KeyCode::Char('z') if ctrl => {
                self.suspending = true;
                Some(command::suspend())
            }
            KeyCode::Char('c') if ctrl => Some(command::interrupt()),
            KeyCode::Char('q') | KeyCode::Escape => Some(command::quit()),
            _ => None,
        }
    }

    fn view(&self) -> String {
        let status = if self.suspending {
            "suspending...".to_string()
        } else {
            format!("resumed {} time(s)", self.resumed)
        };
        format!("{status}\n\nctrl+z: suspend (fg to resume)  q: quit  ctrl+c: interrupt\n")
    }
}

fn main() {
    let outcome = Program::new(Suspender::default()).run();
    match outcome.result {
        Ok(()) => println!("bye after {} resume(s)", outcome.model.resumed),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}
