//! Command tag generation.

/// Generates sequential command tags (`A0001`, `A0002`, ...).
///
/// Owned by exactly one connection, so a plain counter is enough.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    prefix: char,
    next: u32,
}

impl TagGenerator {
    /// Creates a generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { prefix, next: 1 }
    }

    /// Returns the next tag. Wraps around after `u32::MAX`, which is harmless
    /// because only one command is outstanding per connection.
    pub fn next_tag(&mut self) -> String {
        let n = self.next;
        self.next = self.next.wrapping_add(1).max(1);
        format!("{}{n:04}", self.prefix)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}
