/// Which source positions a hypothesis has translated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coverage {
    bits: Box<[u64]>,
    len: usize,
}

impl Coverage {
    pub fn new(len: usize) -> Self {
        Self {
            bits: vec![0; len.div_ceil(64)].into_boxed_slice(),
            len,
        }
    }

    #[inline]
    pub fn is_covered(&self, pos: usize) -> bool {
        self.bits[pos / 64] & (1 << (pos % 64)) != 0
    }

    /// True when no position in `[begin, end)` is covered yet.
    pub fn compatible(&self, begin: usize, end: usize) -> bool {
        end <= self.len && (begin..end).all(|p| !self.is_covered(p))
    }

    /// Coverage with `[begin, end)` added. The span must be compatible.
    pub fn with_span(&self, begin: usize, end: usize) -> Self {
        debug_assert!(self.compatible(begin, end));
        let mut next = self.clone();
        for p in begin..end {
            next.bits[p / 64] |= 1 << (p % 64);
        }
        next
    }

    /// First position not yet covered; `len` when full.
    pub fn first_uncovered(&self) -> usize {
        (0..self.len)
            .find(|&p| !self.is_covered(p))
            .unwrap_or(self.len)
    }

    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_full(&self) -> bool {
        self.count() == self.len
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximal uncovered spans, left to right.
    pub fn gaps(&self) -> Vec<(usize, usize)> {
        let mut gaps = Vec::new();
        let mut start = None;
        for p in 0..self.len {
            match (self.is_covered(p), start) {
                (false, None) => start = Some(p),
                (true, Some(s)) => {
                    gaps.push((s, p));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            gaps.push((s, self.len));
        }
        gaps
    }
}
