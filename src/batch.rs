//! Grouping of consumed records into topic-homogeneous batches.
//!
//! Batches are contiguous sub-slices of the input, so concatenating them
//! yields the input in its original order.
//!
//! ```rust
//! use tdengine_sink::batch::group;
//! use tdengine_sink::SinkRecord;
//!
//! let records = vec![
//!     SinkRecord::new("a", 0, 0, "m v=1i 1"),
//!     SinkRecord::new("a", 0, 1, "m v=2i 2"),
//!     SinkRecord::new("b", 0, 0, "m v=3i 3"),
//! ];
//! let batches = group(&records, 10);
//! assert_eq!(batches.len(), 2);
//! assert_eq!(batches[0].len(), 2);
//! assert_eq!(batches[1].topic(), "b");
//! ```

use crate::SinkRecord;

/// An ordered run of records sharing one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'a> {
    records: &'a [SinkRecord],
}

impl<'a> Batch<'a> {
    pub fn records(&self) -> &'a [SinkRecord] {
        self.records
    }

    pub fn topic(&self) -> &'a str {
        self.records.first().map(|r| r.topic.as_str()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Lazy iterator over the batches of a record slice.
pub struct Batches<'a> {
    remaining: &'a [SinkRecord],
    max_size: usize,
}

/// Splits `records` into batches, cutting whenever the topic changes or a
/// batch reaches `max_size` records. A `max_size` of 0 disables the cap.
pub fn batches(records: &[SinkRecord], max_size: usize) -> Batches<'_> {
    Batches {
        remaining: records,
        max_size,
    }
}

/// Collecting form of [`batches`].
pub fn group(records: &[SinkRecord], max_size: usize) -> Vec<Batch<'_>> {
    batches(records, max_size).collect()
}

impl<'a> Iterator for Batches<'a> {
    type Item = Batch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.remaining.first()?;

        let mut len = 1;
        for record in &self.remaining[1..] {
            if self.max_size > 0 && len == self.max_size {
                break;
            }
            if record.topic != first.topic {
                break;
            }
            len += 1;
        }

        let (head, tail) = self.remaining.split_at(len);
        self.remaining = tail;
        Some(Batch { records: head })
    }
}
