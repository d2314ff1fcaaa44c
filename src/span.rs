/// A byte range inside a reduction-description source file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }

    /// A one-byte span at `offset`, used for locations reported by the
    /// YAML parser.
    pub fn at(offset: usize) -> Self {
        let start = offset as u32;
        Self {
            start,
            end: start.saturating_add(1),
        }
    }

    pub fn range(self) -> std::ops::Range<usize> {
        self.start as usize..self.end as usize
    }

    pub fn is_dummy(self) -> bool {
        self.start == 0 && self.end == 0
    }
}
