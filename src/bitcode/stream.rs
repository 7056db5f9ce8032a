//! Record streams.
//!
//! Block decoders consume an abstract stream of three event kinds: enter a
//! nested block, read one record, leave the current block. Two
//! implementations are provided:
//!
//! - [`EventStream`]: an in-memory event list with a builder API. This is
//!   what tests use, and what adapters over an external bit-level reader
//!   produce.
//! - [`WordStream`]: decodes events from the fixed-width 32-bit word
//!   serialization used by `translate_bytes` (tag word, then operands; each
//!   record value is two words, low half first). This stands in for the
//!   variable-bit-rate reader, which lives outside this crate.
//!
//! Both track a bit position so diagnostics can point back into the file.

/// One tagged, variable-length integer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub code: u64,
    pub values: Vec<u64>,
}

/// One event in the record stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Enter a nested block with the given block ID.
    EnterBlock(u64),
    /// One record inside the current block.
    Record(Record),
    /// Leave the current block.
    ExitBlock,
}

/// Word-serialization tags. Shared by [`EventStream::to_bytes`] and
/// [`WordStream`].
const TAG_ENTER: u32 = 1;
const TAG_EXIT: u32 = 2;
const TAG_RECORD: u32 = 3;

/// Number of 32-bit words an event occupies in the word serialization.
fn event_words(event: &StreamEvent) -> u64 {
    match event {
        StreamEvent::EnterBlock(_) => 2,
        StreamEvent::ExitBlock => 1,
        StreamEvent::Record(rec) => 3 + 2 * rec.values.len() as u64,
    }
}

/// Abstract record stream consumed by the block decoders.
///
/// Returning `None` means the underlying input is exhausted (or, for
/// byte-backed implementations, truncated; decoders treat a premature end
/// inside an open block as a structural failure either way).
pub trait RecordStream {
    fn next_event(&mut self) -> Option<StreamEvent>;

    /// Bit offset of the most recently delivered event.
    fn bit_position(&self) -> u64;
}

/// In-memory record stream with a builder API.
#[derive(Debug, Default)]
pub struct EventStream {
    events: Vec<StreamEvent>,
    cursor: usize,
    bit: u64,
    next_bit: u64,
}

impl EventStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an enter-block event.
    pub fn enter_block(&mut self, block_id: u64) -> &mut Self {
        self.events.push(StreamEvent::EnterBlock(block_id));
        self
    }

    /// Append a record event.
    pub fn record(&mut self, code: u64, values: &[u64]) -> &mut Self {
        self.events.push(StreamEvent::Record(Record {
            code,
            values: values.to_vec(),
        }));
        self
    }

    /// Append an exit-block event.
    pub fn exit_block(&mut self) -> &mut Self {
        self.events.push(StreamEvent::ExitBlock);
        self
    }

    /// Serialize to a complete module file: header prelude followed by the
    /// 32-bit word form of every event.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = super::header::Header::encode().to_vec();
        let mut push = |word: u32| bytes.extend_from_slice(&word.to_le_bytes());
        for event in &self.events {
            match event {
                StreamEvent::EnterBlock(id) => {
                    push(TAG_ENTER);
                    push(*id as u32);
                }
                StreamEvent::ExitBlock => {
                    push(TAG_EXIT);
                }
                StreamEvent::Record(rec) => {
                    push(TAG_RECORD);
                    push(rec.code as u32);
                    push(rec.values.len() as u32);
                    for value in &rec.values {
                        push(*value as u32);
                        push((*value >> 32) as u32);
                    }
                }
            }
        }
        bytes
    }
}

impl RecordStream for EventStream {
    fn next_event(&mut self) -> Option<StreamEvent> {
        let event = self.events.get(self.cursor)?.clone();
        self.cursor += 1;
        self.bit = self.next_bit;
        self.next_bit += 32 * event_words(&event);
        Some(event)
    }

    fn bit_position(&self) -> u64 {
        self.bit
    }
}

/// Record stream decoded from the 32-bit word serialization.
#[derive(Debug)]
pub struct WordStream {
    words: Vec<u32>,
    cursor: usize,
    bit: u64,
    /// Bit offset of the payload within the whole file (header size).
    base_bit: u64,
}

impl WordStream {
    /// Decode the payload that follows the header. `base_bit` is the bit
    /// offset of the payload in the whole file, so diagnostics point at
    /// absolute positions.
    pub fn new(payload: &[u8], base_bit: u64) -> Self {
        let words = payload
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self {
            words,
            cursor: 0,
            bit: base_bit,
            base_bit,
        }
    }

    fn take_word(&mut self) -> Option<u32> {
        let word = *self.words.get(self.cursor)?;
        self.cursor += 1;
        Some(word)
    }
}

impl RecordStream for WordStream {
    fn next_event(&mut self) -> Option<StreamEvent> {
        self.bit = self.base_bit + 32 * self.cursor as u64;
        let event = match self.take_word()? {
            TAG_ENTER => StreamEvent::EnterBlock(self.take_word()? as u64),
            TAG_EXIT => StreamEvent::ExitBlock,
            TAG_RECORD => {
                let code = self.take_word()? as u64;
                let count = self.take_word()? as usize;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    let lo = self.take_word()? as u64;
                    let hi = self.take_word()? as u64;
                    values.push(lo | (hi << 32));
                }
                StreamEvent::Record(Record { code, values })
            }
            // Unknown tag: stop delivering events. The decoder sees a
            // premature end-of-stream and reports it as structural.
            _ => return None,
        };
        Some(event)
    }

    fn bit_position(&self) -> u64 {
        self.bit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_stream_replays_in_order() {
        let mut stream = EventStream::new();
        stream.enter_block(8).record(1, &[1]).exit_block();

        assert_eq!(stream.next_event(), Some(StreamEvent::EnterBlock(8)));
        assert_eq!(
            stream.next_event(),
            Some(StreamEvent::Record(Record {
                code: 1,
                values: vec![1]
            }))
        );
        assert_eq!(stream.next_event(), Some(StreamEvent::ExitBlock));
        assert_eq!(stream.next_event(), None);
    }

    #[test]
    fn test_bit_position_advances() {
        let mut stream = EventStream::new();
        stream.enter_block(8).exit_block();
        assert_eq!(stream.bit_position(), 0);
        stream.next_event();
        assert_eq!(stream.bit_position(), 0);
        stream.next_event();
        assert_eq!(stream.bit_position(), 64);
    }

    #[test]
    fn test_word_roundtrip() {
        let mut stream = EventStream::new();
        stream
            .enter_block(8)
            .record(7, &[0, u64::MAX, 1 << 40])
            .enter_block(17)
            .exit_block()
            .exit_block();
        let bytes = stream.to_bytes();
        let payload = &bytes[super::super::header::HEADER_SIZE..];
        let mut decoded = WordStream::new(payload, 64);

        let mut events = Vec::new();
        while let Some(event) = decoded.next_event() {
            events.push(event);
        }
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], StreamEvent::EnterBlock(8));
        assert_eq!(
            events[1],
            StreamEvent::Record(Record {
                code: 7,
                values: vec![0, u64::MAX, 1 << 40]
            })
        );
        assert_eq!(events[4], StreamEvent::ExitBlock);
    }

    #[test]
    fn test_truncated_words_end_the_stream() {
        let mut stream = EventStream::new();
        stream.enter_block(8).record(7, &[42]);
        let bytes = stream.to_bytes();
        // Chop the record's value words off.
        let payload = &bytes[super::super::header::HEADER_SIZE..bytes.len() - 8];
        let mut decoded = WordStream::new(payload, 64);
        assert_eq!(decoded.next_event(), Some(StreamEvent::EnterBlock(8)));
        assert_eq!(decoded.next_event(), None);
    }
}
