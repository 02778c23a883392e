mod support;

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tape_runtime::{command, Cmd, ExecCommand, Msg, Program};

use support::{headless_config, tag, CapturedOutput, RecordingRenderer, Recorder, RenderEvent, Tag};

fn run(model: Recorder, renderer: &RecordingRenderer) -> Recorder {
    let output = CapturedOutput::default();
    Program::with_config(model, headless_config(&output))
        .expect("valid config")
        .with_renderer(renderer.clone())
        .run()
        .into_result()
        .expect("graceful exit")
}

#[test]
fn batch_delivers_every_message() {
    let renderer = RecordingRenderer::default();
    let init = command::batch([tag(1), tag(2), tag(3)]);
    let mut tags = run(Recorder::until_tags(init, 3), &renderer).tags;
    tags.sort_unstable();
    assert_eq!(tags, vec![1, 2, 3]);
}

#[test]
fn batches_skip_the_model_but_sequences_reach_it() {
    let renderer = RecordingRenderer::default();
    let init = command::batch([tag(1), command::sequence([tag(2), tag(3)])]);
    let model = run(Recorder::until_tags(init, 3), &renderer);
    assert!(!model.saw("Batch"));
    assert!(model.saw("Sequence(0)"));
}

#[test]
fn sequence_preserves_order() {
    let renderer = RecordingRenderer::default();
    let slow = Some(Cmd::new(|| {
        std::thread::sleep(Duration::from_millis(30));
        Some(Msg::custom(Tag(1)))
    }));
    let init = command::sequence([slow, tag(2), None, tag(3)]);
    let model = run(Recorder::until_tags(init, 3), &renderer);
    assert_eq!(model.tags, vec![1, 2, 3]);
}

#[test]
fn nested_sequences_run_in_order() {
    let renderer = RecordingRenderer::default();
    let init = command::sequence([
        tag(1),
        command::sequence([tag(2), tag(3)]),
        tag(4),
    ]);
    let model = run(Recorder::until_tags(init, 4), &renderer);
    assert_eq!(model.tags, vec![1, 2, 3, 4]);
}

#[test]
fn commands_returned_from_update_run() {
    let renderer = RecordingRenderer::default();
    let model = Recorder::new(tag(1), |msg, tags| match msg.downcast_ref::<Tag>() {
        Some(Tag(1)) => tag(2),
        Some(_) if tags.len() == 2 => Some(command::quit()),
        _ => None,
    });
    assert_eq!(run(model, &renderer).tags, vec![1, 2]);
}

#[test]
fn filter_can_drop_and_rewrite_messages() {
    let renderer = RecordingRenderer::default();
    let output = CapturedOutput::default();
    let init = command::sequence([tag(1), tag(2), tag(3)]);
    let model = Program::with_config(Recorder::until_tags(init, 2), headless_config(&output))
        .expect("valid config")
        .with_renderer(renderer.clone())
        .with_filter(|_, msg| match msg.downcast_ref::<Tag>() {
            Some(Tag(2)) => None,
            Some(Tag(3)) => Some(Msg::custom(Tag(30))),
            _ => Some(msg),
        })
        .run()
        .into_result()
        .expect("graceful exit");
    assert_eq!(model.tags, vec![1, 30]);
}

#[test]
fn println_goes_above_the_frame() {
    let renderer = RecordingRenderer::default();
    let init = command::sequence([Some(command::println("hello")), tag(1)]);
    run(Recorder::until_tags(init, 1), &renderer);
    assert!(renderer
        .events()
        .contains(&RenderEvent::InsertAbove("hello".to_string())));
}

#[test]
fn clear_screen_and_repaint_reach_the_renderer() {
    let renderer = RecordingRenderer::default();
    let init = command::sequence([
        Some(command::clear_screen()),
        Some(Cmd::message(Msg::Repaint)),
        tag(1),
    ]);
    run(Recorder::until_tags(init, 1), &renderer);
    assert_eq!(renderer.count(&RenderEvent::ClearScreen), 1);
    assert_eq!(renderer.count(&RenderEvent::Repaint), 1);
}

struct CountingProcess(Arc<AtomicUsize>);

impl ExecCommand for CountingProcess {
    fn run(&mut self) -> io::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn exec_releases_and_restores_the_terminal() {
    let renderer = RecordingRenderer::default();
    let runs = Arc::new(AtomicUsize::new(0));
    let process = CountingProcess(Arc::clone(&runs));
    let init = command::exec_process(process, |result| {
        result.ok().map(|()| Msg::custom(Tag(99)))
    });
    let model = run(Recorder::until_tags(Some(init), 1), &renderer);

    assert_eq!(model.tags, vec![99]);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(model.saw("Exec(spent)"));
    // Closed once for the release and once at exit.
    assert_eq!(renderer.count(&RenderEvent::Close), 2);
    assert_eq!(renderer.count(&RenderEvent::Reset), 1);
}
