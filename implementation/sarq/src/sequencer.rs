/// Hands out data frame ids `1, 2, ..., 255, 1, 2, ...`.
///
/// Zero is never produced since it marks acknowledgment frames.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct Sequencer {
    last: u8,
}

impl Sequencer {
    /// Creates a sequencer whose first id is 1.
    pub fn new() -> Self {
        Sequencer { last: 0 }
    }

    /// Draws the next id.
    pub fn next_id(&mut self) -> u8 {
        self.last = match self.last {
            u8::MAX => 1,
            n => n + 1,
        };
        self.last
    }
}

impl Iterator for Sequencer {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        Some(self.next_id())
    }
}
