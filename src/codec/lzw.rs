//! Variable-width LZW as used by TIFF (compression code 5).
//!
//! Codes start at 9 bits and grow to 12 bits as the string table fills.
//! Codes are packed MSB-first. Code width switches one entry early, which is
//! the behavior every TIFF reader expects, so the encoder and decoder below
//! agree on the exact switch points:
//!
//! - `256` clears the table and resets the code width to 9 bits
//! - `257` marks the end of information
//! - new strings are assigned codes from `258` upwards
//!
//! The encoder matches strings through an open-addressed hash table with
//! double hashing and clears the table early when the compression ratio
//! stops improving. The decoder rebuilds the string table from the code
//! stream and reports inconsistent streams as [`CodecError::CorruptTable`].

use crate::error::CodecError;

const BITS_MIN: u32 = 9;
const BITS_MAX: u32 = 12;

const CODE_CLEAR: u16 = 256;
const CODE_EOI: u16 = 257;
const CODE_FIRST: u16 = 258;
const CODE_MAX: u16 = max_code(BITS_MAX) as u16;

/// Number of entries in the decoder's string table.
const TABLE_SIZE: usize = 1 << BITS_MAX;

/// Size of the encoder's hash table (prime, ~91% occupancy at 4096 codes).
const HSIZE: usize = 9001;
const HSHIFT: u32 = 13 - 8;

/// Input bytes between two compression ratio checks.
const CHECK_GAP: i64 = 10_000;

/// Room kept free at the end of the output for the last codes of a stream.
const OUTPUT_RESERVE: usize = 5;

/// Extra output bytes granted on top of 1.5x the input.
const BUDGET_SLACK: usize = 64;

#[inline]
const fn max_code(nbits: u32) -> u32 {
    (1 << nbits) - 1
}

/// Output size that is always enough to encode `len` input bytes.
///
/// Every code covers at least one byte and is at most 12 bits wide, so the
/// stream never exceeds 1.5x the input plus the clear codes.
pub fn output_budget(len: usize) -> usize {
    len + len / 2 + len / 1024 + BUDGET_SLACK
}

// =============================================================================
// Bit Packing
// =============================================================================

struct BitWriter {
    out: Vec<u8>,
    nextdata: u64,
    nextbits: u32,
    outcount: i64,
}

impl BitWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
            nextdata: 0,
            nextbits: 0,
            outcount: 0,
        }
    }

    fn put(&mut self, code: u16, nbits: u32) {
        self.nextdata = (self.nextdata << nbits) | u64::from(code);
        self.nextbits += nbits;
        self.out.push((self.nextdata >> (self.nextbits - 8)) as u8);
        self.nextbits -= 8;
        if self.nextbits >= 8 {
            self.out.push((self.nextdata >> (self.nextbits - 8)) as u8);
            self.nextbits -= 8;
        }
        self.outcount += i64::from(nbits);
    }

    fn finish(mut self) -> Vec<u8> {
        if self.nextbits > 0 {
            self.out.push((self.nextdata << (8 - self.nextbits)) as u8);
        }
        self.out
    }
}

struct BitReader<'a> {
    input: &'a [u8],
    pos: usize,
    nextdata: u64,
    nextbits: u32,
    bits_left: u64,
}

impl<'a> BitReader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            nextdata: 0,
            nextbits: 0,
            bits_left: input.len() as u64 * 8,
        }
    }

    fn pull_byte(&mut self) {
        let byte = self.input.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        self.nextdata = (self.nextdata << 8) | u64::from(byte);
        self.nextbits += 8;
    }

    /// Next code, or `None` once fewer than `nbits` bits remain.
    fn next(&mut self, nbits: u32) -> Option<u16> {
        if self.bits_left < u64::from(nbits) {
            return None;
        }
        self.pull_byte();
        if self.nextbits < nbits {
            self.pull_byte();
        }
        let code = (self.nextdata >> (self.nextbits - nbits)) & u64::from(max_code(nbits));
        self.nextbits -= nbits;
        self.bits_left -= u64::from(nbits);
        Some(code as u16)
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Result of one encoder run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOutcome {
    /// Input bytes represented by `output`
    pub consumed: usize,

    /// Packed code stream
    pub output: Vec<u8>,

    /// Whether the whole input was encoded and the stream terminated with EOI
    pub complete: bool,
}

#[derive(Clone, Copy)]
struct HashSlot {
    fcode: i64,
    code: u16,
}

const EMPTY_SLOT: HashSlot = HashSlot { fcode: -1, code: 0 };

struct Encoder {
    writer: BitWriter,
    table: Vec<HashSlot>,
    nbits: u32,
    maxcode: u32,
    free_ent: u16,
    checkpoint: i64,
    ratio: i64,
    incount: i64,
}

impl Encoder {
    fn new(budget: usize) -> Self {
        Self {
            writer: BitWriter::with_capacity(budget),
            table: vec![EMPTY_SLOT; HSIZE],
            nbits: BITS_MIN,
            maxcode: max_code(BITS_MIN),
            free_ent: CODE_FIRST,
            checkpoint: CHECK_GAP,
            ratio: 0,
            incount: 0,
        }
    }

    fn put(&mut self, code: u16) {
        self.writer.put(code, self.nbits);
    }

    /// Reset the table and emit a clear code at the current width.
    fn clear_block(&mut self) {
        self.table.fill(EMPTY_SLOT);
        self.ratio = 0;
        self.incount = 0;
        self.writer.outcount = 0;
        self.free_ent = CODE_FIRST;
        self.put(CODE_CLEAR);
        self.nbits = BITS_MIN;
        self.maxcode = max_code(BITS_MIN);
    }

    fn current_ratio(&self) -> i64 {
        let incount = self.incount;
        let outcount = self.writer.outcount;
        if incount > 0x007f_ffff {
            let scaled = outcount >> 8;
            if scaled == 0 {
                0x7fff_ffff
            } else {
                incount / scaled
            }
        } else if outcount == 0 {
            0x7fff_ffff
        } else {
            (incount << 8) / outcount
        }
    }

    /// Probe the hash table for `fcode`, returning the hit code or the free slot.
    fn lookup(&self, c: u8, ent: u16, fcode: i64) -> Result<u16, usize> {
        let mut h = (usize::from(c) << HSHIFT) ^ usize::from(ent);
        if h >= HSIZE {
            h -= HSIZE;
        }
        if self.table[h].fcode == fcode {
            return Ok(self.table[h].code);
        }
        if self.table[h].fcode >= 0 {
            let disp = if h == 0 { 1 } else { HSIZE - h };
            loop {
                h = if h >= disp { h - disp } else { h + HSIZE - disp };
                let slot = self.table[h];
                if slot.fcode == fcode {
                    return Ok(slot.code);
                }
                if slot.fcode < 0 {
                    break;
                }
            }
        }
        Err(h)
    }
}

/// Encode `input` into at most roughly `budget` bytes.
///
/// When the output budget runs out the encoder stops early. The returned
/// outcome then has `complete == false` and `consumed` tells how many input
/// bytes the partial stream represents, so the caller can retry with a larger
/// budget or continue from there.
pub fn encode(input: &[u8], budget: usize) -> EncodeOutcome {
    let limit = budget.saturating_sub(OUTPUT_RESERVE);
    let mut enc = Encoder::new(budget);

    let Some((&first, rest)) = input.split_first() else {
        enc.put(CODE_EOI);
        return EncodeOutcome {
            consumed: 0,
            output: enc.writer.finish(),
            complete: true,
        };
    };

    enc.put(CODE_CLEAR);
    let mut ent = u16::from(first);
    let mut ent_start = 0usize;
    enc.incount += 1;

    for (offset, &c) in rest.iter().enumerate() {
        let position = offset + 1;
        enc.incount += 1;

        let fcode = (i64::from(c) << BITS_MAX) + i64::from(ent);
        let slot = match enc.lookup(c, ent, fcode) {
            Ok(code) => {
                ent = code;
                continue;
            }
            Err(slot) => slot,
        };

        if enc.writer.out.len() > limit {
            return EncodeOutcome {
                consumed: ent_start,
                output: enc.writer.finish(),
                complete: false,
            };
        }

        enc.put(ent);
        ent = u16::from(c);
        ent_start = position;
        enc.table[slot] = HashSlot {
            fcode,
            code: enc.free_ent,
        };
        enc.free_ent += 1;

        if enc.free_ent == CODE_MAX - 1 {
            enc.clear_block();
        } else if u32::from(enc.free_ent) > enc.maxcode {
            enc.nbits += 1;
            enc.maxcode = max_code(enc.nbits);
        } else if enc.incount >= enc.checkpoint {
            enc.checkpoint = enc.incount + CHECK_GAP;
            let ratio = enc.current_ratio();
            if ratio <= enc.ratio {
                enc.clear_block();
            } else {
                enc.ratio = ratio;
            }
        }
    }

    if enc.writer.out.len() > limit {
        return EncodeOutcome {
            consumed: ent_start,
            output: enc.writer.finish(),
            complete: false,
        };
    }

    enc.put(ent);
    let free_ent = enc.free_ent + 1;
    if free_ent == CODE_MAX - 1 {
        enc.put(CODE_CLEAR);
        enc.nbits = BITS_MIN;
    } else if u32::from(free_ent) > enc.maxcode {
        enc.nbits += 1;
    }
    enc.put(CODE_EOI);

    EncodeOutcome {
        consumed: input.len(),
        output: enc.writer.finish(),
        complete: true,
    }
}

// =============================================================================
// Decoder
// =============================================================================

const NO_PREFIX: u16 = u16::MAX;

#[derive(Clone, Copy)]
struct Entry {
    prefix: u16,
    length: u16,
    value: u8,
    first: u8,
}

const UNUSED_ENTRY: Entry = Entry {
    prefix: NO_PREFIX,
    length: 0,
    value: 0,
    first: 0,
};

/// Decode a code stream into `out`, returning the number of bytes written.
///
/// Decoding stops at the end-of-information code, when `out` is full, or when
/// the input runs out of bits (an implicit end of information).
///
/// # Errors
/// `CorruptTable` when a code refers to a string the table cannot hold.
pub fn decode_into(input: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
    let mut table = vec![UNUSED_ENTRY; TABLE_SIZE];
    for (code, entry) in table.iter_mut().take(256).enumerate() {
        *entry = Entry {
            prefix: NO_PREFIX,
            length: 1,
            value: code as u8,
            first: code as u8,
        };
    }

    let mut reader = BitReader::new(input);
    let mut nbits = BITS_MIN;
    let mut maxcode = max_code(nbits) as usize - 1;
    let mut free = usize::from(CODE_FIRST);
    let mut old: Option<u16> = None;
    let mut pos = 0usize;

    while pos < out.len() {
        let Some(mut code) = reader.next(nbits) else {
            break;
        };
        if code == CODE_EOI {
            break;
        }

        if code == CODE_CLEAR {
            loop {
                free = usize::from(CODE_FIRST);
                table[free..].fill(UNUSED_ENTRY);
                nbits = BITS_MIN;
                maxcode = max_code(nbits) as usize - 1;
                match reader.next(nbits) {
                    Some(next) => code = next,
                    None => return Ok(pos),
                }
                if code != CODE_CLEAR {
                    break;
                }
            }
            if code == CODE_EOI {
                break;
            }
            if code > CODE_CLEAR {
                return Err(CodecError::CorruptTable("first code after clear is not a literal"));
            }
            out[pos] = code as u8;
            pos += 1;
            old = Some(code);
            continue;
        }

        let prefix = old.ok_or(CodecError::CorruptTable("stream does not start with a clear code"))?;
        if free >= TABLE_SIZE {
            return Err(CodecError::CorruptTable("string table overflow"));
        }

        let prev = table[usize::from(prefix)];
        let value = if usize::from(code) < free {
            table[usize::from(code)].first
        } else {
            prev.first
        };
        table[free] = Entry {
            prefix,
            length: prev.length + 1,
            value,
            first: prev.first,
        };
        free += 1;
        if free > maxcode {
            nbits = (nbits + 1).min(BITS_MAX);
            maxcode = max_code(nbits) as usize - 1;
        }
        old = Some(code);

        if code < 256 {
            out[pos] = code as u8;
            pos += 1;
            continue;
        }

        let entry = table[usize::from(code)];
        if entry.length == 0 {
            return Err(CodecError::CorruptTable("code refers to an undefined string"));
        }
        pos += write_string(&table, code, &mut out[pos..])?;
    }

    Ok(pos)
}

/// Write the string for `code` into the front of `out`, clipped to its length.
fn write_string(table: &[Entry], code: u16, out: &mut [u8]) -> Result<usize, CodecError> {
    let length = usize::from(table[usize::from(code)].length);
    let mut cursor = code;
    for i in (0..length).rev() {
        let entry = table[usize::from(cursor)];
        if i < out.len() {
            out[i] = entry.value;
        }
        if i > 0 {
            cursor = entry.prefix;
            if cursor == NO_PREFIX {
                return Err(CodecError::CorruptTable("string chain ends early"));
            }
        }
    }
    Ok(length.min(out.len()))
}

/// Decode a code stream into a new buffer of at most `capacity` bytes.
pub fn decode(input: &[u8], capacity: usize) -> Result<Vec<u8>, CodecError> {
    let mut out = vec![0u8; capacity];
    let written = decode_into(input, &mut out)?;
    out.truncate(written);
    Ok(out)
}

// =============================================================================
// Tests
// =============================================================================
