//! Standard controller input handling
//!
//! The pad is an 8-bit shift register. Writing bit 0 high holds the register
//! at button A; once the strobe drops, each read returns the next button in
//! A, B, Select, Start, Up, Down, Left, Right order and then reads as 1.

/// Button bit masks, in shift-out order
pub const BUTTON_A: u8 = 0b0000_0001;
pub const BUTTON_B: u8 = 0b0000_0010;
pub const BUTTON_SELECT: u8 = 0b0000_0100;
pub const BUTTON_START: u8 = 0b0000_1000;
pub const BUTTON_UP: u8 = 0b0001_0000;
pub const BUTTON_DOWN: u8 = 0b0010_0000;
pub const BUTTON_LEFT: u8 = 0b0100_0000;
pub const BUTTON_RIGHT: u8 = 0b1000_0000;

/// Standard NES controller
#[derive(Debug, Clone)]
pub struct Controller {
    buttons: u8,
    strobe: bool,
    cursor: u8,
}

impl Controller {
    pub fn new() -> Self {
        Self {
            buttons: 0,
            strobe: false,
            cursor: 0,
        }
    }

    /// Handle a write to $4016
    pub fn write(&mut self, value: u8) {
        self.strobe = (value & 0x01) != 0;
        if self.strobe {
            self.cursor = 0;
        }
    }

    /// Handle a read from $4016/$4017
    pub fn read(&mut self) -> u8 {
        if self.cursor > 7 {
            return 1;
        }
        let value = (self.buttons >> self.cursor) & 0x01;
        if !self.strobe {
            self.cursor += 1;
        }
        value
    }

    pub fn press(&mut self, button: u8) {
        self.buttons |= button;
    }

    pub fn release(&mut self, button: u8) {
        self.buttons &= !button;
    }

    /// Replace the whole button byte at once
    pub fn set_buttons(&mut self, buttons: u8) {
        self.buttons = buttons;
    }

    pub fn buttons(&self) -> u8 {
        self.buttons
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(pad: &mut Controller) -> Vec<u8> {
        (0..10).map(|_| pad.read()).collect()
    }

    #[test]
    fn test_shift_order() {
        let mut pad = Controller::new();
        pad.press(BUTTON_A);
        pad.press(BUTTON_START);
        pad.press(BUTTON_RIGHT);
        pad.write(1);
        pad.write(0);
        assert_eq!(read_all(&mut pad), vec![1, 0, 0, 1, 0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_strobe_high_repeats_a() {
        let mut pad = Controller::new();
        pad.set_buttons(BUTTON_A);
        pad.write(1);
        assert_eq!(pad.read(), 1);
        assert_eq!(pad.read(), 1);
        pad.release(BUTTON_A);
        assert_eq!(pad.read(), 0);
    }

    #[test]
    fn test_restrobe_rewinds() {
        let mut pad = Controller::new();
        pad.set_buttons(BUTTON_B);
        pad.write(0);
        assert_eq!(pad.read(), 0);
        assert_eq!(pad.read(), 1);
        pad.write(1);
        pad.write(0);
        assert_eq!(pad.read(), 0);
        assert_eq!(pad.read(), 1);
    }
}
