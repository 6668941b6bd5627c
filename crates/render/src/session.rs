use crate::device::Device;
use crate::frame::{FrameError, FrameRenderer, FrameStats};
use std::time::{Duration, Instant};

/// What the host hands the renderer each iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Seconds since the session started. Never decreases.
    pub time: f64,
    pub exit_requested: bool,
}

impl Tick {
    pub fn at(time: f64) -> Self {
        Self {
            time,
            exit_requested: false,
        }
    }

    pub fn exit() -> Self {
        Self {
            time: 0.0,
            exit_requested: true,
        }
    }
}

/// Source of ticks for [`Session::run`]. Blocks until the next frame is due.
pub trait Host {
    fn next_tick(&mut self) -> Tick;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Presented(FrameStats),
    Finished,
}

/// The render loop. The exit flag is checked before a frame starts, never
/// in the middle of one; once the session has finished it draws nothing more.
#[derive(Debug)]
pub struct Session {
    renderer: FrameRenderer,
    finished: bool,
}

impl Session {
    pub fn new(renderer: FrameRenderer) -> Self {
        Self {
            renderer,
            finished: false,
        }
    }

    pub fn renderer(&self) -> &FrameRenderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut FrameRenderer {
        &mut self.renderer
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Handle one host tick. A frame error finishes the session.
    pub fn advance<D: Device + ?Sized>(&mut self, device: &mut D, tick: Tick) -> Result<TickOutcome, FrameError> {
        if self.finished {
            return Ok(TickOutcome::Finished);
        }
        if tick.exit_requested {
            tracing::info!(frames = self.renderer.frame_index(), "exit requested");
            self.finished = true;
            return Ok(TickOutcome::Finished);
        }
        match self.renderer.tick(device, tick.time) {
            Ok(stats) => Ok(TickOutcome::Presented(stats)),
            Err(e) => {
                tracing::error!("{e}");
                self.finished = true;
                Err(e)
            }
        }
    }

    /// Pull ticks from `host` until it asks to exit. Returns the number of
    /// frames presented.
    pub fn run<D: Device + ?Sized, H: Host + ?Sized>(&mut self, device: &mut D, host: &mut H) -> Result<u64, FrameError> {
        while let TickOutcome::Presented(_) = self.advance(device, host.next_tick())? {}
        Ok(self.renderer.frame_index())
    }

    pub fn into_renderer(self) -> FrameRenderer {
        self.renderer
    }
}

/// A host that delivers a fixed number of ticks, then asks to exit.
#[derive(Debug, Clone)]
pub struct FixedTicks {
    remaining: u64,
    step: f64,
    time: f64,
    interval: Option<Duration>,
    last: Option<Instant>,
}

impl FixedTicks {
    /// `frames` ticks whose times advance by `step` seconds.
    pub fn new(frames: u64, step: f64) -> Self {
        Self {
            remaining: frames,
            step,
            time: 0.0,
            interval: None,
            last: None,
        }
    }

    /// Sleep between ticks so they arrive at most `fps` times per second.
    pub fn paced(mut self, fps: u32) -> Self {
        self.interval = (fps > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(fps)));
        self
    }
}

impl Host for FixedTicks {
    fn next_tick(&mut self) -> Tick {
        if self.remaining == 0 {
            return Tick::exit();
        }
        if let (Some(interval), Some(last)) = (self.interval, self.last) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last = Some(Instant::now());
        self.remaining -= 1;
        let tick = Tick::at(self.time);
        self.time += self.step;
        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryBuffer;
    use crate::headless::HeadlessDevice;
    use crate::program::load_program;
    use lumen_assets::builtin;
    use lumen_common::{Mesh, TransformSet};

    fn session(device: &mut HeadlessDevice) -> Session {
        let (v, f) = builtin::passthrough_pair();
        let program = load_program(device, &v, &f).unwrap();
        let geometry = GeometryBuffer::upload(device, &Mesh::triangle()).unwrap();
        Session::new(FrameRenderer::new(program, geometry, TransformSet::IDENTITY))
    }

    #[test]
    fn runs_until_host_exits() {
        let mut device = HeadlessDevice::new();
        let mut session = session(&mut device);
        let frames = session.run(&mut device, &mut FixedTicks::new(4, 0.25)).unwrap();
        assert_eq!(frames, 4);
        assert_eq!(device.presented(), 4);
        assert!(session.is_finished());
    }

    #[test]
    fn exit_is_checked_before_the_frame() {
        let mut device = HeadlessDevice::new();
        let mut session = session(&mut device);
        device.take_calls();

        assert_eq!(session.advance(&mut device, Tick::exit()), Ok(TickOutcome::Finished));
        assert!(device.calls().is_empty());

        // Later ticks are ignored even without the flag.
        assert_eq!(session.advance(&mut device, Tick::at(1.0)), Ok(TickOutcome::Finished));
        assert_eq!(device.presented(), 0);
    }

    #[test]
    fn frame_error_finishes_the_session() {
        let mut device = HeadlessDevice::new();
        let mut session = session(&mut device);
        let renderer_program = session.renderer().program().id();
        device.delete_program(renderer_program).unwrap();

        let err = session.advance(&mut device, Tick::at(0.0)).unwrap_err();
        assert_eq!(err.step, crate::frame::FrameStep::ActivateProgram);
        assert!(session.is_finished());
    }

    #[test]
    fn fixed_ticks_advance_time() {
        let mut host = FixedTicks::new(2, 0.5);
        assert_eq!(host.next_tick(), Tick::at(0.0));
        assert_eq!(host.next_tick(), Tick::at(0.5));
        assert!(host.next_tick().exit_requested);
    }
}
