mod support;

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tape_runtime::{command, Cmd, Context, KillReason, Msg, Program, ProgramError};

use support::{headless_config, tag, CapturedOutput, RecordingRenderer, Recorder, RenderEvent, TIMEOUT};

fn program(model: Recorder, renderer: &RecordingRenderer) -> Program<Recorder> {
    let output = CapturedOutput::default();
    Program::with_config(model, headless_config(&output))
        .expect("valid config")
        .with_renderer(renderer.clone())
}

#[test]
fn quit_returns_final_model_and_renders_last_frame() {
    let renderer = RecordingRenderer::default();
    let model = Recorder::until_tags(tag(7), 1);
    let outcome = program(model, &renderer).run();

    let model = outcome.into_result().expect("graceful exit");
    assert_eq!(model.tags, vec![7]);
    assert_eq!(renderer.flushed_view().as_deref(), Some("tags: [7]"));
    assert_eq!(renderer.count(&RenderEvent::Close), 1);
}

#[test]
fn interrupt_ends_with_interrupted() {
    let renderer = RecordingRenderer::default();
    let model = Recorder::new(Some(command::interrupt()), |_, _| None);
    let outcome = program(model, &renderer).run();

    assert!(matches!(outcome.result, Err(ProgramError::Interrupted)));
    assert_eq!(renderer.count(&RenderEvent::Close), 1);
}

#[test]
fn kill_from_another_thread_ends_with_killed() {
    let renderer = RecordingRenderer::default();
    let program = program(Recorder::new(None, |_, _| None), &renderer);
    let handle = program.handle();
    let killer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        handle.kill();
    });

    let outcome = program.run();
    killer.join().expect("killer thread");
    assert_eq!(
        outcome.result.expect_err("killed").kill_reason(),
        Some(KillReason::Killed)
    );
    assert_eq!(renderer.count(&RenderEvent::Close), 1);
}

#[test]
fn concurrent_kill_and_quit_tear_down_once() {
    let renderer = RecordingRenderer::default();
    let program = program(Recorder::new(None, |_, _| None), &renderer);
    let quitter = program.handle();
    let killer = program.handle();
    let threads = vec![
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            quitter.quit();
        }),
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            killer.kill();
        }),
    ];

    let _ = program.run();
    for thread in threads {
        thread.join().expect("control thread");
    }
    assert_eq!(renderer.count(&RenderEvent::Close), 1);
}

#[test]
fn parent_context_cancellation_kills_the_program() {
    let renderer = RecordingRenderer::default();
    let output = CapturedOutput::default();
    let parent = Context::new();
    let config = headless_config(&output).with_context(parent.clone());
    let program = Program::with_config(Recorder::new(None, |_, _| None), config)
        .expect("valid config")
        .with_renderer(renderer.clone());

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        parent.cancel();
    });
    let outcome = program.run();
    canceller.join().expect("canceller");
    assert_eq!(
        outcome.result.expect_err("cancelled").kill_reason(),
        Some(KillReason::ContextCancelled)
    );
}

#[test]
fn panic_in_command_is_recovered() {
    let renderer = RecordingRenderer::default();
    let output = CapturedOutput::default();
    let init = Cmd::new(|| panic!("command exploded"));
    let outcome = Program::with_config(
        Recorder::new(Some(init), |_, _| None),
        headless_config(&output),
    )
    .expect("valid config")
    .with_renderer(renderer.clone())
    .run();

    assert_eq!(
        outcome.result.expect_err("panicked").kill_reason(),
        Some(KillReason::Panic)
    );
    assert_eq!(renderer.count(&RenderEvent::Close), 1);
    // Paste mode off and the cursor shown again before `run` returns.
    assert!(output.contents().ends_with("\x1b[?2004l\x1b[?25h"));
}

#[test]
fn panic_in_update_is_recovered() {
    let renderer = RecordingRenderer::default();
    let model = Recorder::new(tag(1), |msg, _| {
        if msg.is::<support::Tag>() {
            panic!("update exploded");
        }
        None
    });
    let outcome = program(model, &renderer).run();

    assert_eq!(
        outcome.result.expect_err("panicked").kill_reason(),
        Some(KillReason::Panic)
    );
    assert_eq!(renderer.count(&RenderEvent::Close), 1);
}

#[test]
fn wait_returns_after_graceful_exit() {
    let renderer = RecordingRenderer::default();
    let program = program(Recorder::until_tags(tag(1), 1), &renderer);
    let handle = program.handle();
    let (tx, rx) = mpsc::channel();
    let waiter = thread::spawn(move || {
        handle.wait();
        tx.send(()).expect("report wait");
    });

    program.run().result.expect("graceful exit");
    rx.recv_timeout(TIMEOUT).expect("wait returned");
    waiter.join().expect("waiter");
}

#[test]
fn send_after_exit_does_not_block() {
    let renderer = RecordingRenderer::default();
    let program = program(Recorder::until_tags(tag(1), 1), &renderer);
    let handle = program.handle();
    program.run().result.expect("graceful exit");

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        handle.send(Msg::custom(support::Tag(2)));
        handle.quit();
        tx.send(()).expect("report send");
    });
    rx.recv_timeout(TIMEOUT).expect("send returned");
}

#[test]
fn messages_from_handles_reach_the_model() {
    let renderer = RecordingRenderer::default();
    let program = program(Recorder::until_tags(None, 2), &renderer);
    let handle = program.handle();
    let sender = thread::spawn(move || {
        handle.send(Msg::custom(support::Tag(10)));
        handle.send(Msg::custom(support::Tag(11)));
    });

    let model = program.run().into_result().expect("graceful exit");
    sender.join().expect("sender");
    assert_eq!(model.tags, vec![10, 11]);
}

#[test]
fn startup_reports_environment_and_size() {
    let renderer = RecordingRenderer::default();
    let model = Recorder::new(None, |msg, _| {
        matches!(msg, Msg::Env(_)).then(command::quit)
    });
    let model = program(model, &renderer)
        .run()
        .into_result()
        .expect("graceful exit");

    assert!(model.saw("Env"));
    assert_eq!(renderer.size(), Some((80, 24)));
}
