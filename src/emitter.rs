use crate::device::InputSink;
use crate::error::{Error, Result};
use crate::keys::codes::{BTN_LEFT, BTN_MIDDLE, BTN_RIGHT, KEY_LEFTSHIFT};
use crate::keys::{ResolvedKeySequence, resolve_char};
use crate::protocol::{ABS_X, ABS_Y, EventType, REL_X, REL_Y};
use std::thread;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// 1 is left, 2 right, 3 middle; anything else falls back to left
    pub fn from_ordinal(ordinal: u32) -> Self {
        match ordinal {
            2 => MouseButton::Right,
            3 => MouseButton::Middle,
            _ => MouseButton::Left,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            MouseButton::Left => BTN_LEFT,
            MouseButton::Right => BTN_RIGHT,
            MouseButton::Middle => BTN_MIDDLE,
        }
    }
}

/// Builds chords, text and pointer actions on top of an `InputSink`.
///
/// All pacing is done with blocking sleeps on the calling thread.
pub struct EventEmitter<S: InputSink> {
    sink: S,
}

impl<S: InputSink> EventEmitter<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    /// Press every key of `seq` in order, then release them in reverse.
    ///
    /// `inter_key_delay` is spread over the whole chord: each press and each
    /// release is followed by `inter_key_delay / (2 * len)`.
    pub fn press_sequence(
        &mut self,
        seq: &ResolvedKeySequence,
        inter_key_delay: Duration,
    ) -> Result<()> {
        if seq.is_empty() {
            return Ok(());
        }
        let steps = u32::try_from(seq.len() * 2).unwrap_or(u32::MAX);
        let step = inter_key_delay / steps;

        for key in seq.keys() {
            if key.shifted {
                self.sink.send_key(KEY_LEFTSHIFT, 1)?;
            }
            self.sink.send_key(key.code, 1)?;
            pause(step);
        }

        for key in seq.keys().iter().rev() {
            self.sink.send_key(key.code, 0)?;
            if key.shifted {
                self.sink.send_key(KEY_LEFTSHIFT, 0)?;
            }
            pause(step);
        }
        Ok(())
    }

    pub fn repeat_sequence(
        &mut self,
        seq: &ResolvedKeySequence,
        times: u32,
        inter_key_delay: Duration,
        inter_repeat_delay: Duration,
    ) -> Result<()> {
        self.repeat_sequences(
            std::slice::from_ref(seq),
            times,
            inter_key_delay,
            inter_repeat_delay,
        )
    }

    /// Play all chords in order, `times` times over.
    pub fn repeat_sequences(
        &mut self,
        seqs: &[ResolvedKeySequence],
        times: u32,
        inter_key_delay: Duration,
        inter_repeat_delay: Duration,
    ) -> Result<()> {
        for round in 0..times {
            if round > 0 {
                pause(inter_repeat_delay);
            }
            for seq in seqs {
                self.press_sequence(seq, inter_key_delay)?;
            }
        }
        Ok(())
    }

    /// Type `text` one character at a time.
    ///
    /// Stops at the first character without a keycode and reports it; the
    /// rest of the text is not typed.
    pub fn type_text(&mut self, text: &str, per_char_delay: Duration) -> Result<()> {
        for (idx, c) in text.chars().enumerate() {
            let key = resolve_char(c).ok_or_else(|| Error::UnknownKey(c.to_string()))?;
            if idx > 0 {
                pause(per_char_delay);
            }
            if key.shifted {
                self.sink.send_shifted_key_press(key.code)?;
            } else {
                self.sink.send_key_press(key.code)?;
            }
        }
        debug!("Typed {} characters", text.chars().count());
        Ok(())
    }

    pub fn click(&mut self, button: MouseButton) -> Result<()> {
        self.sink.send_key_press(button.code())
    }

    pub fn move_mouse_absolute(&mut self, x: i32, y: i32) -> Result<()> {
        self.sink.emit_raw(EventType::Absolute, ABS_X, x)?;
        self.sink.emit_raw(EventType::Absolute, ABS_Y, y)?;
        self.sink.sync()
    }

    /// Zero deltas are skipped; the Sync is always sent.
    pub fn move_mouse_relative(&mut self, dx: i32, dy: i32) -> Result<()> {
        if dx != 0 {
            self.sink.emit_raw(EventType::Relative, REL_X, dx)?;
        }
        if dy != 0 {
            self.sink.emit_raw(EventType::Relative, REL_Y, dy)?;
        }
        self.sink.sync()
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
