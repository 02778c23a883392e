use std::time::Duration;

use tape_runtime::{
    command, Cmd, ColorProfile, ColorTarget, InputEvent, Model, Msg, Program, ProgramConfig, Rgb,
};

/// Shows what the runtime learns about the terminal's colors.
struct ColorReport {
    profile: Option<ColorProfile>,
    background: Option<Rgb>,
    foreground: Option<Rgb>,
    truecolor_capability: Option<bool>,
}

impl Model for ColorReport {
    fn init(&mut self) -> Option<Cmd> {
        command::batch([
            Some(command::request_background_color()),
            Some(command::request_foreground_color()),
            Some(command::request_capability("RGB")),
            Some(command::tick(Duration::from_secs(10), |_| Msg::Quit)),
        ])
    }

    fn update(&mut self, msg: Msg) -> Option<Cmd> {
        match msg {
            Msg::ColorProfile(profile) => self.profile = Some(profile),
            Msg::Color {
                target: ColorTarget::Background,
                color,
            } => self.background = Some(color),
            Msg::Color {
                target: ColorTarget::Foreground,
                color,
            } => self.foreground = Some(color),
            Msg::Capability { ref name, ref value } if name == "RGB" => {
                self.truecolor_capability = Some(value.is_some());
            }
            Msg::Input(InputEvent::Key(_)) => return Some(command::quit()),
            _ => {}
        }
        None
    }

    fn view(&self) -> String {
        let describe = |color: Option<Rgb>| match color {
            Some(color) if color.is_dark() => format!("{color} (dark)"),
            Some(color) => format!("{color} (light)"),
            None => "unknown".to_string(),
        };
        let profile = self
            .profile
            .map_or_else(|| "detecting...".to_string(), |profile| profile.to_string());
        let capability = match self.truecolor_capability {
            Some(true) => "advertised",
            Some(false) => "not advertised",
            None => "no answer",
        };
        format!(
            "color profile: {profile}\nbackground:    {}\nforeground:    {}\nRGB capability: {capability}\n\npress any key to exit\n",
            describe(self.background),
            describe(self.foreground),
        )
    }
}

fn main() {
    let model = ColorReport {
        profile: None,
        background: None,
        foreground: None,
        truecolor_capability: None,
    };
    let program = match Program::with_config(model, ProgramConfig::new()) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(2);
        }
    };
    if let Err(err) = program.run().result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
