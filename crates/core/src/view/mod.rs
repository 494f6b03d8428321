//! Mount contract between a host page and a sequence.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    completion::CompletionSignal,
    driver::{DriverState, FrameLoop, LoopSummary, Sequence, SequenceDriver, TickOutcome},
    host::{FrameRegistry, ResizeSubscription, Viewport, ViewportBus},
    render::{FrameRng, Renderer},
    timeline::Clock,
};

/// Facilities a host lends to every view it mounts.
#[derive(Debug, Clone, Default)]
pub struct Host {
    pub frames: FrameRegistry,
    pub viewport: ViewportBus,
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_surface() -> Self {
        Self {
            frames: FrameRegistry::without_surface(),
            viewport: ViewportBus::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountOptions {
    /// Show the end state straight away; no sequence runs.
    pub skip: bool,
    /// Seed for frame randomness. Unseeded when absent.
    pub seed: Option<u64>,
    /// Size to fit the surface to before the first frame.
    pub viewport: Option<Viewport>,
}

enum Body<R: Renderer> {
    Running(SequenceDriver<R>),
    EndState(R),
}

/// A mounted sequence. Dropping the view unmounts it.
pub struct SequenceView<R: Renderer> {
    name: String,
    body: Option<Body<R>>,
    resize: Option<ResizeSubscription>,
}

impl<R: Renderer> SequenceView<R> {
    /// Mounts `sequence` on `host`.
    ///
    /// With `skip` set the renderer paints its end state, audio is released
    /// and completion is disarmed without firing.
    pub fn mount(
        sequence: Sequence<R>,
        options: MountOptions,
        host: &Host,
        completion: CompletionSignal,
        clock: Box<dyn Clock>,
    ) -> Self {
        let name = sequence.name.clone();
        let resize = Some(host.viewport.subscribe());

        let body = if options.skip {
            let Sequence {
                mut renderer,
                mut audio,
                ..
            } = sequence;
            let mut completion = completion;
            completion.disarm();
            audio.dispose();
            if let Some(viewport) = options.viewport {
                renderer.resize(viewport);
            }
            renderer.render_end_state();
            tracing::info!(sequence = %name, "skipped to end state");
            Body::EndState(renderer)
        } else {
            let mut sequence = sequence;
            if let Some(viewport) = options.viewport {
                sequence.renderer.resize(viewport);
            }
            let rng = FrameRng::from_seed(options.seed);
            Body::Running(SequenceDriver::start(sequence, completion, &host.frames, clock, rng))
        };

        Self {
            name,
            body: Some(body),
            resize,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_mounted(&self) -> bool {
        self.body.is_some()
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.body, Some(Body::EndState(_)))
    }

    pub fn driver(&self) -> Option<&SequenceDriver<R>> {
        match &self.body {
            Some(Body::Running(driver)) => Some(driver),
            _ => None,
        }
    }

    pub fn renderer(&self) -> Option<&R> {
        match &self.body {
            Some(Body::Running(driver)) => Some(driver.renderer()),
            Some(Body::EndState(renderer)) => Some(renderer),
            None => None,
        }
    }

    /// Applies any pending resize, then ticks the driver.
    pub fn tick(&mut self) -> TickOutcome {
        self.apply_pending_resize();
        match &mut self.body {
            Some(Body::Running(driver)) => driver.tick(),
            _ => TickOutcome::Inactive,
        }
    }

    /// Runs frames until the sequence completes, is unmounted or the loop
    /// stops.
    pub fn run(&mut self, frame_loop: &mut FrameLoop) -> LoopSummary {
        let Some(active) = self.driver().and_then(SequenceDriver::active_flag) else {
            return LoopSummary::default();
        };
        frame_loop.run(&active, || self.tick())
    }

    pub fn driver_state(&self) -> Option<DriverState> {
        self.driver().map(SequenceDriver::state)
    }

    fn apply_pending_resize(&mut self) {
        let Some(viewport) = self.resize.as_ref().and_then(ResizeSubscription::take_pending) else {
            return;
        };
        match &mut self.body {
            Some(Body::Running(driver)) => driver.resize(viewport),
            Some(Body::EndState(renderer)) => {
                renderer.resize(viewport);
                renderer.render_end_state();
            }
            None => {}
        }
    }

    /// Synchronous teardown: the resize listener is removed, the frame
    /// registration cancelled and audio closed before this returns.
    pub fn unmount(&mut self) {
        if let Some(mut resize) = self.resize.take() {
            resize.remove();
        }
        if let Some(body) = self.body.take() {
            if let Body::Running(mut driver) = body {
                driver.teardown();
            }
            tracing::debug!(sequence = %self.name, "view unmounted");
        }
    }
}

impl<R: Renderer> Drop for SequenceView<R> {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl<R: Renderer> fmt::Debug for SequenceView<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceView")
            .field("name", &self.name)
            .field("mounted", &self.is_mounted())
            .field("skipped", &self.is_skipped())
            .field("driver", &self.driver_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc, time::Duration};

    use super::*;
    use crate::{
        audio::{AudioContext, AudioEngine, OfflineFactory},
        driver::FixedStepFrames,
        mapping::IntensityMatrix,
        render::{BuildupRenderer, NullRenderer},
        timeline::{ManualClock, Timeline},
        AudioConfig, RenderConfig,
    };

    fn sequence<R: Renderer>(renderer: R, factory: &OfflineFactory) -> Sequence<R> {
        Sequence {
            name: "view-test".to_string(),
            token: "view-test-complete".to_string(),
            timeline: Timeline::new(Duration::from_secs(1)).at(Duration::ZERO, "hum", |cue| {
                cue.audio.click(0.0, 0.2);
            }),
            intensities: IntensityMatrix::buildup(),
            renderer,
            audio: AudioEngine::new(AudioConfig::default(), factory.clone()),
        }
    }

    fn counting_signal() -> (Rc<RefCell<u32>>, CompletionSignal) {
        let count = Rc::new(RefCell::new(0));
        let sink = count.clone();
        (count, CompletionSignal::callback("view-test-complete", move |_| *sink.borrow_mut() += 1))
    }

    #[test]
    fn skip_renders_end_state_without_running() {
        let host = Host::new();
        let factory = OfflineFactory::new();
        let (completions, signal) = counting_signal();
        let mut view = SequenceView::mount(
            sequence(NullRenderer::default(), &factory),
            MountOptions {
                skip: true,
                ..MountOptions::default()
            },
            &host,
            signal,
            Box::new(ManualClock::new()),
        );

        assert!(view.is_skipped());
        assert!(view.renderer().unwrap().end_state);
        assert_eq!(view.tick(), TickOutcome::Inactive);
        assert_eq!(host.frames.issued(), 0);
        assert_eq!(factory.created(), 0);
        assert_eq!(*completions.borrow(), 0);
    }

    #[test]
    fn resize_events_refit_the_surface() {
        let host = Host::new();
        let factory = OfflineFactory::new();
        let renderer = BuildupRenderer::new(&RenderConfig::default(), "RARE");
        let mut view = SequenceView::mount(
            sequence(renderer, &factory),
            MountOptions::default(),
            &host,
            CompletionSignal::discard("view-test-complete"),
            Box::new(ManualClock::new()),
        );

        host.viewport.broadcast(Viewport::new(200, 100).with_pixel_ratio(2.0));
        view.tick();
        let canvas = view.renderer().unwrap().canvas();
        assert_eq!((canvas.width(), canvas.height()), (400, 200));
    }

    #[test]
    fn unmount_releases_everything_synchronously() {
        let host = Host::new();
        let factory = OfflineFactory::new();
        let (completions, signal) = counting_signal();
        let clock = ManualClock::new();
        let mut view = SequenceView::mount(
            sequence(NullRenderer::default(), &factory),
            MountOptions::default(),
            &host,
            signal,
            Box::new(clock.clone()),
        );
        view.tick();
        assert_eq!(host.frames.live(), 1);
        assert_eq!(host.viewport.listener_count(), 1);

        view.unmount();
        view.unmount();
        assert_eq!(host.frames.live(), 0);
        assert_eq!(host.viewport.listener_count(), 0);
        assert_eq!(factory.last().unwrap().active_voices(), 0);

        clock.advance(Duration::from_secs(5));
        assert_eq!(view.tick(), TickOutcome::Inactive);
        assert_eq!(*completions.borrow(), 0);
    }

    #[test]
    fn mount_cycles_do_not_leak() {
        let host = Host::new();
        let factory = OfflineFactory::new();
        for _ in 0..4 {
            let clock = ManualClock::new();
            let mut view = SequenceView::mount(
                sequence(NullRenderer::default(), &factory),
                MountOptions::default(),
                &host,
                CompletionSignal::discard("view-test-complete"),
                Box::new(clock.clone()),
            );
            let mut frame_loop = FrameLoop::new(FixedStepFrames::new(clock, Duration::from_millis(100)).with_limit(3));
            view.run(&mut frame_loop);
        }
        assert_eq!(host.frames.live(), 0);
        assert_eq!(host.viewport.listener_count(), 0);
        assert_eq!(factory.created(), 4);
    }

    #[test]
    fn completion_reaches_the_host_once() {
        let host = Host::new();
        let factory = OfflineFactory::new();
        let (completions, signal) = counting_signal();
        let clock = ManualClock::new();
        let mut view = SequenceView::mount(
            sequence(NullRenderer::default(), &factory),
            MountOptions {
                seed: Some(11),
                ..MountOptions::default()
            },
            &host,
            signal,
            Box::new(clock.clone()),
        );

        let mut frame_loop = FrameLoop::new(FixedStepFrames::new(clock, Duration::from_millis(20)));
        let summary = view.run(&mut frame_loop);
        assert!(summary.completed);
        assert_eq!(summary.frames, 51);
        assert_eq!(view.driver_state(), Some(DriverState::Complete));

        drop(view);
        assert_eq!(*completions.borrow(), 1);
    }

    #[test]
    fn surfaceless_host_completes_immediately() {
        let host = Host::without_surface();
        let factory = OfflineFactory::new();
        let (completions, signal) = counting_signal();
        let mut view = SequenceView::mount(
            sequence(NullRenderer::default(), &factory),
            MountOptions::default(),
            &host,
            signal,
            Box::new(ManualClock::new()),
        );
        let mut frame_loop = FrameLoop::new(FixedStepFrames::new(ManualClock::new(), Duration::from_millis(20)));

        assert_eq!(view.run(&mut frame_loop), LoopSummary::default());
        assert_eq!(view.driver_state(), Some(DriverState::Degraded));
        assert_eq!(*completions.borrow(), 1);
    }
}
