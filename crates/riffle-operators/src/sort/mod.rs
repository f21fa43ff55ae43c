//! External sorting.

pub mod external;
pub mod run;

pub use external::ExternalSort;

/// Opaque tag that keeps temporary files of paired sorts apart. A join wraps
/// its children in one `Left` and one `Right` sort; a standalone sort can
/// use either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}
