// src/led.rs
use std::convert::Infallible;
use std::fmt::Debug;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{info, trace, warn};
use smart_leds::{RGB8, SmartLedsWrite, gamma};

const WHITE: RGB8 = RGB8 {
    r: 255,
    g: 255,
    b: 255,
};

// Pixels painted white, advanced one step per tick while the strip is on
const DANCE_START: [usize; 4] = [2, 7, 15, 20];

const TURN_ON_DELAY: Duration = Duration::from_millis(25);
const DANCE_DELAY: Duration = Duration::from_millis(2);
const FADE_DELAY: Duration = Duration::from_millis(5);
const FADE_STEPS: usize = 255;
pub const IDLE_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LedCommand {
    /// Sets the base colour and turns the strip on.
    SetColor(RGB8),
    Off,
}

/// One strip update and how long to hold it.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub pixels: Vec<RGB8>,
    pub hold: Duration,
}

pub struct LedAnimator {
    leds: Vec<RGB8>,
    color: RGB8,
    dance: [usize; 4],
    on: bool,
    shown_on: bool,
}

impl LedAnimator {
    pub fn new(count: usize) -> Self {
        let count = count.max(1);
        LedAnimator {
            leds: vec![RGB8::default(); count],
            color: WHITE,
            // Strips shorter than the start layout fold it onto their pixels
            dance: DANCE_START.map(|pos| pos % count),
            on: false,
            shown_on: false,
        }
    }

    pub fn apply(&mut self, command: LedCommand) {
        match command {
            LedCommand::SetColor(color) => {
                self.color = color;
                self.on = true;
            }
            LedCommand::Off => self.on = false,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Frames for one pass of the animation loop.
    pub fn tick(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();

        if self.on && !self.shown_on {
            self.shown_on = true;
            self.wipe(TURN_ON_DELAY, &mut frames);
        }

        if !self.on && self.shown_on {
            self.shown_on = false;
            self.fade_out(&mut frames);
        }

        if self.on {
            let count = self.leds.len();
            for pos in self.dance.iter_mut() {
                *pos = (*pos + 1) % count;
            }
            self.wipe(DANCE_DELAY, &mut frames);
        }

        frames
    }

    // Repaints pixel by pixel, one frame per pixel
    fn wipe(&mut self, hold: Duration, frames: &mut Vec<Frame>) {
        for i in 0..self.leds.len() {
            self.leds[i] = if self.dance.contains(&i) {
                WHITE
            } else {
                self.color
            };
            frames.push(Frame {
                pixels: self.leds.clone(),
                hold,
            });
        }
    }

    fn fade_out(&mut self, frames: &mut Vec<Frame>) {
        for _ in 0..FADE_STEPS {
            self.color = RGB8 {
                r: self.color.r.saturating_sub(1),
                g: self.color.g.saturating_sub(1),
                b: self.color.b.saturating_sub(1),
            };
            self.leds.fill(self.color);
            frames.push(Frame {
                pixels: self.leds.clone(),
                hold: FADE_DELAY,
            });
        }
    }
}

/// Drives `driver` from LED commands until the sending side goes away.
pub fn run_strip<D>(driver: &mut D, rx: Receiver<LedCommand>, count: usize)
where
    D: SmartLedsWrite<Color = RGB8>,
    D::Error: Debug,
{
    info!("Starting LED strip with {} pixels", count);
    let mut animator = LedAnimator::new(count);

    loop {
        for frame in animator.tick() {
            if let Err(e) = driver.write(gamma(frame.pixels.into_iter())) {
                warn!("LED write failed: {:?}", e);
            }
            thread::sleep(frame.hold);
        }

        match rx.recv_timeout(IDLE_DELAY) {
            Ok(command) => {
                animator.apply(command);
                while let Ok(command) = rx.try_recv() {
                    animator.apply(command);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("LED command channel closed");
                return;
            }
        }
    }
}

/// Host stand-in for the strip: logs every frame as hex.
#[derive(Debug, Default)]
pub struct LogStrip {
    frames: u64,
}

impl SmartLedsWrite for LogStrip {
    type Error = Infallible;
    type Color = RGB8;

    fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        let bytes: Vec<u8> = iterator
            .into_iter()
            .flat_map(|pixel| {
                let color: RGB8 = pixel.into();
                [color.r, color.g, color.b]
            })
            .collect();
        self.frames += 1;
        trace!("frame {}: {}", self.frames, hex::encode(bytes));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEAL: RGB8 = RGB8 { r: 0, g: 128, b: 128 };

    fn white_positions(frame: &Frame) -> Vec<usize> {
        frame
            .pixels
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == WHITE)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn idle_strip_draws_nothing() {
        let mut animator = LedAnimator::new(24);
        assert!(animator.tick().is_empty());
        animator.apply(LedCommand::Off);
        assert!(animator.tick().is_empty());
    }

    #[test]
    fn turning_on_wipes_then_dances() {
        let mut animator = LedAnimator::new(24);
        animator.apply(LedCommand::SetColor(TEAL));

        let frames = animator.tick();
        assert_eq!(frames.len(), 48);
        assert!(frames[..24].iter().all(|f| f.hold == TURN_ON_DELAY));
        assert!(frames[24..].iter().all(|f| f.hold == DANCE_DELAY));

        assert_eq!(frames[0].pixels[0], TEAL);
        assert_eq!(frames[0].pixels[1], RGB8::default());
        assert_eq!(white_positions(&frames[23]), vec![2, 7, 15, 20]);
        assert_eq!(white_positions(&frames[47]), vec![3, 8, 16, 21]);
        assert_eq!(frames[47].pixels[2], TEAL);
    }

    #[test]
    fn staying_on_only_dances() {
        let mut animator = LedAnimator::new(24);
        animator.apply(LedCommand::SetColor(TEAL));
        animator.tick();

        let frames = animator.tick();
        assert_eq!(frames.len(), 24);
        assert_eq!(white_positions(frames.last().unwrap()), vec![4, 9, 17, 22]);
    }

    #[test]
    fn dance_wraps_around_the_strip() {
        let mut animator = LedAnimator::new(22);
        animator.apply(LedCommand::SetColor(TEAL));
        animator.tick();

        let frames = animator.tick();
        assert_eq!(white_positions(frames.last().unwrap()), vec![0, 4, 9, 17]);
    }

    #[test]
    fn short_strip_shows_the_dance_on_turn_on() {
        let mut animator = LedAnimator::new(4);
        animator.apply(LedCommand::SetColor(TEAL));

        let frames = animator.tick();
        assert_eq!(frames.len(), 8);
        assert_eq!(white_positions(&frames[3]), vec![0, 2, 3]);
        assert_eq!(frames[3].pixels[1], TEAL);
        assert_eq!(white_positions(&frames[7]), vec![0, 1, 3]);
        assert_eq!(frames[7].pixels[2], TEAL);
    }

    #[test]
    fn turning_off_fades_to_black() {
        let mut animator = LedAnimator::new(8);
        animator.apply(LedCommand::SetColor(RGB8 { r: 3, g: 0, b: 200 }));
        animator.tick();
        animator.apply(LedCommand::Off);
        assert!(!animator.is_on());

        let frames = animator.tick();
        assert_eq!(frames.len(), FADE_STEPS);
        assert!(frames.iter().all(|f| f.hold == FADE_DELAY));
        assert!(frames[0].pixels.iter().all(|p| *p == RGB8 { r: 2, g: 0, b: 199 }));
        assert!(frames[254].pixels.iter().all(|p| *p == RGB8::default()));

        assert!(animator.tick().is_empty());
    }

    #[test]
    fn colour_change_while_on_applies_on_next_dance() {
        let mut animator = LedAnimator::new(24);
        animator.apply(LedCommand::SetColor(TEAL));
        animator.tick();

        let red = RGB8 { r: 255, g: 0, b: 0 };
        animator.apply(LedCommand::SetColor(red));
        let frames = animator.tick();
        assert_eq!(frames.len(), 24);
        assert_eq!(frames[23].pixels[0], red);
    }

    #[test]
    fn log_strip_accepts_frames() {
        let mut strip = LogStrip::default();
        strip.write(vec![TEAL, WHITE]).unwrap();
        strip.write([RGB8::default()]).unwrap();
        assert_eq!(strip.frames, 2);
    }

    #[test]
    fn strip_thread_exits_when_channel_closes() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(LedCommand::Off).unwrap();
        drop(tx);

        let mut strip = LogStrip::default();
        run_strip(&mut strip, rx, 4);
        assert_eq!(strip.frames, 0);
    }
}
