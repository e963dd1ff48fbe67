//! ISO BMFF box tree: header reading, breadth-first tree construction,
//! and typed payload decoding for the atoms the player needs.

use byteorder::{BigEndian, ReadBytesExt};
use fc_common::{DemuxError, TrackKind, VideoCodec};
use std::collections::VecDeque;
use std::io::{Read, Seek, SeekFrom};
use tracing::{trace, warn};

/// Make a fourcc code from 4 bytes.
pub const fn fourcc(b: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*b)
}

pub const FTYP: u32 = fourcc(b"ftyp");
pub const MOOV: u32 = fourcc(b"moov");
pub const MVHD: u32 = fourcc(b"mvhd");
pub const TRAK: u32 = fourcc(b"trak");
pub const TKHD: u32 = fourcc(b"tkhd");
pub const EDTS: u32 = fourcc(b"edts");
pub const ELST: u32 = fourcc(b"elst");
pub const MDIA: u32 = fourcc(b"mdia");
pub const MDHD: u32 = fourcc(b"mdhd");
pub const HDLR: u32 = fourcc(b"hdlr");
pub const MINF: u32 = fourcc(b"minf");
pub const VMHD: u32 = fourcc(b"vmhd");
pub const SMHD: u32 = fourcc(b"smhd");
pub const DINF: u32 = fourcc(b"dinf");
pub const DREF: u32 = fourcc(b"dref");
pub const STBL: u32 = fourcc(b"stbl");
pub const STSD: u32 = fourcc(b"stsd");
pub const AVC1: u32 = fourcc(b"avc1");
pub const HVC1: u32 = fourcc(b"hvc1");
pub const AVCC: u32 = fourcc(b"avcC");
pub const HVCC: u32 = fourcc(b"hvcC");
pub const BTRT: u32 = fourcc(b"btrt");
pub const PASP: u32 = fourcc(b"pasp");
pub const STTS: u32 = fourcc(b"stts");
pub const CTTS: u32 = fourcc(b"ctts");
pub const STSC: u32 = fourcc(b"stsc");
pub const STSZ: u32 = fourcc(b"stsz");
pub const STCO: u32 = fourcc(b"stco");
pub const CO64: u32 = fourcc(b"co64");
pub const STSS: u32 = fourcc(b"stss");
pub const MDAT: u32 = fourcc(b"mdat");
pub const UDTA: u32 = fourcc(b"udta");
pub const FREE: u32 = fourcc(b"free");
pub const WIDE: u32 = fourcc(b"wide");
pub const VAPC: u32 = fourcc(b"vapc");

/// Synthetic root node type (never appears on the wire).
pub const ROOT: u32 = fourcc(b"root");

/// Atom types the parser will accept as a first child. Anything else in
/// first position truncates that subtree (malformed or opaque data).
const KNOWN_TYPES: &[u32] = &[
    FTYP, MOOV, MVHD, TRAK, TKHD, EDTS, ELST, MDIA, MDHD, HDLR, MINF, VMHD, SMHD, DINF, DREF,
    STBL, STSD, AVC1, HVC1, AVCC, HVCC, BTRT, PASP, STTS, CTTS, STSC, STSZ, STCO, CO64, STSS,
    MDAT, UDTA, FREE, WIDE, VAPC,
];

pub fn is_known_type(t: u32) -> bool {
    KNOWN_TYPES.contains(&t)
}

/// Format a fourcc for logging.
pub fn fourcc_str(t: u32) -> String {
    let b = t.to_be_bytes();
    b.iter()
        .map(|&c| {
            if c.is_ascii_graphic() {
                c as char
            } else {
                '?'
            }
        })
        .collect()
}

/// Compact 8-byte header size (u32 length + fourcc).
const HEADER_SIZE: u64 = 8;

/// Extra payload bytes before the first child of container atoms that carry
/// a fixed leading record: the sample description entry count, and the
/// visual sample entry fields of avc1/hvc1 (24 + 2 + 2 + 14 + 32 + 4).
fn pre_child_offset(box_type: u32) -> u64 {
    match box_type {
        STSD => 8,
        AVC1 | HVC1 => 78,
        _ => 0,
    }
}

// ─── Box header ───

/// A parsed box header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// Fourcc type code.
    pub box_type: u32,
    /// Total size including header (and largesize extension if present).
    pub size: u64,
    /// Absolute offset of the box start.
    pub offset: u64,
    /// Header length: 8, or 16 when the largesize extension is present.
    pub header_size: u64,
}

impl BoxHeader {
    /// Offset of the box payload.
    pub fn content_offset(&self) -> u64 {
        self.offset + self.header_size
    }

    /// Payload size in bytes.
    pub fn content_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size)
    }

    /// Offset one past the end of this box.
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size
    }
}

/// Read a box header at `offset`, bounded by `limit` (one past the last
/// readable byte). Returns `Ok(None)` when the remaining span is too short
/// for a header.
pub fn read_header_at<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    limit: u64,
) -> Result<Option<BoxHeader>, DemuxError> {
    if limit.saturating_sub(offset) < HEADER_SIZE {
        return Ok(None);
    }
    reader.seek(SeekFrom::Start(offset))?;
    let size32 = reader.read_u32::<BigEndian>()?;
    let box_type = reader.read_u32::<BigEndian>()?;

    let (size, header_size) = match size32 {
        0 => (limit - offset, HEADER_SIZE), // box extends to end of span
        1 => {
            if limit.saturating_sub(offset) < HEADER_SIZE + 8 {
                return Ok(None);
            }
            let large = reader.read_u64::<BigEndian>()?;
            if large == 0 {
                return Err(DemuxError::InvalidStructure {
                    offset,
                    reason: "largesize extension is zero".into(),
                });
            }
            (large, HEADER_SIZE + 8)
        }
        s => (s as u64, HEADER_SIZE),
    };

    if size < header_size {
        return Err(DemuxError::InvalidStructure {
            offset,
            reason: format!("declared size {size} smaller than header"),
        });
    }
    Ok(Some(BoxHeader {
        box_type,
        size,
        offset,
        header_size,
    }))
}

// ─── Typed payload data ───

/// stsc run-length entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRun {
    /// 1-based index of the first chunk this run applies to.
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub desc_index: u32,
}

/// stts run-length entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRun {
    pub sample_count: u32,
    pub sample_delta: u32,
}

/// Structured payload attached to a recognized box at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum BoxData {
    /// stsz: global size (0 = per-sample sizes follow) and declared count.
    SampleSizes {
        default_size: u32,
        count: u32,
        sizes: Vec<u32>,
    },
    /// stsc entries.
    ChunkRuns(Vec<ChunkRun>),
    /// stco/co64 absolute chunk offsets.
    ChunkOffsets(Vec<u64>),
    /// stts entries.
    TimeRuns(Vec<TimeRun>),
    /// ctts, expanded to one composition offset per sample.
    CompositionOffsets(Vec<u32>),
    /// stss sync sample indices, converted to 0-based.
    SyncSamples(Vec<u32>),
    /// hdlr track kind.
    Handler(TrackKind),
    /// mvhd movie timescale and duration (version aware).
    MovieHeader { timescale: u32, duration: u64 },
    /// mdhd media timescale (version aware).
    MediaHeader { timescale: u32 },
    /// avc1/hvc1 fixed fields.
    VisualSampleEntry {
        codec: VideoCodec,
        width: u16,
        height: u16,
    },
    /// avcC/hvcC raw payload, decoded later by the parameter set extractor.
    CodecConfig(Vec<u8>),
}

// Payload readers. Each tolerates a short payload by returning an
// empty/default value instead of reading out of bounds.

fn be_u16(p: &[u8], at: usize) -> Option<u16> {
    p.get(at..at + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn be_u32(p: &[u8], at: usize) -> Option<u32> {
    p.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn be_u64(p: &[u8], at: usize) -> Option<u64> {
    p.get(at..at + 8).map(|b| {
        u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
    })
}

fn decode_stsz(p: &[u8]) -> BoxData {
    let default_size = be_u32(p, 4).unwrap_or(0);
    let count = be_u32(p, 8).unwrap_or(0);
    let mut sizes = Vec::new();
    if default_size == 0 {
        sizes.reserve(count as usize);
        for i in 0..count as usize {
            match be_u32(p, 12 + i * 4) {
                Some(s) => sizes.push(s),
                None => break,
            }
        }
    }
    BoxData::SampleSizes {
        default_size,
        count,
        sizes,
    }
}

fn decode_stsc(p: &[u8]) -> BoxData {
    let count = be_u32(p, 4).unwrap_or(0);
    let mut runs = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let at = 8 + i * 12;
        let (Some(first_chunk), Some(samples_per_chunk), Some(desc_index)) =
            (be_u32(p, at), be_u32(p, at + 4), be_u32(p, at + 8))
        else {
            break;
        };
        runs.push(ChunkRun {
            first_chunk,
            samples_per_chunk,
            desc_index,
        });
    }
    BoxData::ChunkRuns(runs)
}

fn decode_chunk_offsets(p: &[u8], wide: bool) -> BoxData {
    let count = be_u32(p, 4).unwrap_or(0);
    let mut offsets = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let v = if wide {
            be_u64(p, 8 + i * 8)
        } else {
            be_u32(p, 8 + i * 4).map(u64::from)
        };
        match v {
            Some(o) => offsets.push(o),
            None => break,
        }
    }
    BoxData::ChunkOffsets(offsets)
}

fn decode_stts(p: &[u8]) -> BoxData {
    let count = be_u32(p, 4).unwrap_or(0);
    let mut runs = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let at = 8 + i * 8;
        let (Some(sample_count), Some(sample_delta)) = (be_u32(p, at), be_u32(p, at + 4)) else {
            break;
        };
        runs.push(TimeRun {
            sample_count,
            sample_delta,
        });
    }
    BoxData::TimeRuns(runs)
}

fn decode_ctts(p: &[u8]) -> BoxData {
    let count = be_u32(p, 4).unwrap_or(0);
    let mut per_sample = Vec::new();
    for i in 0..count as usize {
        let at = 8 + i * 8;
        let (Some(sample_count), Some(offset)) = (be_u32(p, at), be_u32(p, at + 4)) else {
            break;
        };
        for _ in 0..sample_count {
            per_sample.push(offset);
        }
    }
    BoxData::CompositionOffsets(per_sample)
}

fn decode_stss(p: &[u8]) -> BoxData {
    let count = be_u32(p, 4).unwrap_or(0);
    let mut indices = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        match be_u32(p, 8 + i * 4) {
            // On the wire sample numbers are 1-based.
            Some(n) if n > 0 => indices.push(n - 1),
            _ => break,
        }
    }
    BoxData::SyncSamples(indices)
}

fn decode_hdlr(p: &[u8]) -> Option<BoxData> {
    let handler = p.get(8..12)?;
    Some(BoxData::Handler(TrackKind::from_handler([
        handler[0], handler[1], handler[2], handler[3],
    ])))
}

fn decode_mvhd(p: &[u8]) -> Option<BoxData> {
    let version = *p.first()?;
    let (timescale, duration) = if version == 1 {
        (be_u32(p, 20)?, be_u64(p, 24)?)
    } else {
        (be_u32(p, 12)?, be_u32(p, 16)? as u64)
    };
    Some(BoxData::MovieHeader {
        timescale,
        duration,
    })
}

fn decode_mdhd(p: &[u8]) -> Option<BoxData> {
    let version = *p.first()?;
    let timescale = if version == 1 {
        be_u32(p, 20)?
    } else {
        be_u32(p, 12)?
    };
    Some(BoxData::MediaHeader { timescale })
}

fn decode_visual_sample_entry(box_type: u32, p: &[u8]) -> Option<BoxData> {
    let codec = match box_type {
        AVC1 => VideoCodec::H264,
        HVC1 => VideoCodec::H265,
        _ => return None,
    };
    Some(BoxData::VisualSampleEntry {
        codec,
        width: be_u16(p, 24)?,
        height: be_u16(p, 26)?,
    })
}

/// Decode the typed payload for a recognized box, reading its content bytes
/// from the source. Boxes with no structured payload (and mdat, whose payload
/// is the media data itself) return `None`.
fn decode_box_data<R: Read + Seek>(
    reader: &mut R,
    header: &BoxHeader,
) -> Result<Option<BoxData>, DemuxError> {
    let decoded = match header.box_type {
        STSZ | STSC | STCO | CO64 | STTS | CTTS | STSS | HDLR | MVHD | MDHD | AVC1 | HVC1
        | AVCC | HVCC => {
            let payload = read_payload(reader, header)?;
            match header.box_type {
                STSZ => Some(decode_stsz(&payload)),
                STSC => Some(decode_stsc(&payload)),
                STCO => Some(decode_chunk_offsets(&payload, false)),
                CO64 => Some(decode_chunk_offsets(&payload, true)),
                STTS => Some(decode_stts(&payload)),
                CTTS => Some(decode_ctts(&payload)),
                STSS => Some(decode_stss(&payload)),
                HDLR => decode_hdlr(&payload),
                MVHD => decode_mvhd(&payload),
                MDHD => decode_mdhd(&payload),
                AVC1 | HVC1 => decode_visual_sample_entry(header.box_type, &payload),
                AVCC | HVCC => Some(BoxData::CodecConfig(payload)),
                _ => unreachable!(),
            }
        }
        _ => None,
    };
    Ok(decoded)
}

fn read_payload<R: Read + Seek>(
    reader: &mut R,
    header: &BoxHeader,
) -> Result<Vec<u8>, DemuxError> {
    let len = header.content_size() as usize;
    let mut payload = vec![0u8; len];
    reader.seek(SeekFrom::Start(header.content_offset()))?;
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

// ─── Box tree ───

/// One node of the box tree. Children are arena indices; `parent` is a
/// non-owning back-reference used only for upward lookup.
#[derive(Debug)]
pub struct BoxNode {
    pub header: BoxHeader,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub data: Option<BoxData>,
}

/// Arena-backed box tree. Node 0 is a synthetic root spanning the whole
/// source; the container's real top-level boxes are its children.
#[derive(Debug)]
pub struct BoxTree {
    nodes: Vec<BoxNode>,
}

impl BoxTree {
    /// Parse a box tree from a byte source of `total_len` bytes.
    ///
    /// Breadth-first: each enqueued box is scanned for children starting at
    /// its payload (plus the pre-child calibration for sample description
    /// atoms). A malformed subtree stops descending there; it does not fail
    /// the whole parse.
    pub fn parse<R: Read + Seek>(reader: &mut R, total_len: u64) -> Result<Self, DemuxError> {
        let root = BoxNode {
            header: BoxHeader {
                box_type: ROOT,
                size: total_len,
                offset: 0,
                header_size: 0,
            },
            parent: None,
            children: Vec::new(),
            data: None,
        };
        let mut tree = Self { nodes: vec![root] };

        let mut queue: VecDeque<usize> = VecDeque::new();
        queue.push_back(0);

        while let Some(idx) = queue.pop_front() {
            let header = tree.nodes[idx].header;

            // A box too small to hold two headers is a leaf.
            if header.box_type != ROOT && header.size < 2 * HEADER_SIZE {
                continue;
            }

            let span_end = header.end_offset().min(total_len);
            let mut cursor = header.content_offset() + pre_child_offset(header.box_type);
            let mut first = true;

            loop {
                let child = match read_header_at(reader, cursor, span_end) {
                    Ok(Some(h)) => h,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(
                            parent = %fourcc_str(header.box_type),
                            offset = cursor,
                            "stopping scan of malformed subtree: {e}"
                        );
                        break;
                    }
                };
                if child.end_offset() > span_end {
                    break;
                }
                // Only the first child must be a recognized type; later
                // unknown siblings become generic traversable boxes.
                if first && !is_known_type(child.box_type) {
                    trace!(
                        parent = %fourcc_str(header.box_type),
                        first_child = %fourcc_str(child.box_type),
                        "unrecognized first child, truncating subtree"
                    );
                    break;
                }
                first = false;

                let data = decode_box_data(reader, &child)?;
                let child_idx = tree.nodes.len();
                tree.nodes.push(BoxNode {
                    header: child,
                    parent: Some(idx),
                    children: Vec::new(),
                    data,
                });
                tree.nodes[idx].children.push(child_idx);
                queue.push_back(child_idx);

                trace!(
                    box_type = %fourcc_str(child.box_type),
                    offset = child.offset,
                    size = child.size,
                    "parsed box"
                );
                cursor = child.end_offset();
            }
        }
        Ok(tree)
    }

    pub fn node(&self, idx: usize) -> &BoxNode {
        &self.nodes[idx]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Preorder search for the first box of `box_type`.
    pub fn find_first(&self, box_type: u32) -> Option<usize> {
        self.find_first_under(0, box_type)
    }

    /// Preorder search limited to the subtree under `start`.
    pub fn find_first_under(&self, start: usize, box_type: u32) -> Option<usize> {
        for &child in &self.nodes[start].children {
            if self.nodes[child].header.box_type == box_type {
                return Some(child);
            }
            if let Some(found) = self.find_first_under(child, box_type) {
                return Some(found);
            }
        }
        None
    }

    /// All boxes of `box_type`, preorder.
    pub fn find_all(&self, box_type: u32) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_under(0, box_type, &mut out);
        out
    }

    fn collect_under(&self, start: usize, box_type: u32, out: &mut Vec<usize>) {
        for &child in &self.nodes[start].children {
            if self.nodes[child].header.box_type == box_type {
                out.push(child);
            }
            self.collect_under(child, box_type, out);
        }
    }

    /// Walk the parent chain looking for an enclosing box of `box_type`.
    pub fn ancestor_of_type(&self, idx: usize, box_type: u32) -> Option<usize> {
        let mut cur = self.nodes[idx].parent;
        while let Some(p) = cur {
            if self.nodes[p].header.box_type == box_type {
                return Some(p);
            }
            cur = self.nodes[p].parent;
        }
        None
    }

    /// Typed data of the first box of `box_type`, if decoded.
    pub fn first_data(&self, box_type: u32) -> Option<&BoxData> {
        self.find_first(box_type)
            .and_then(|idx| self.nodes[idx].data.as_ref())
    }

    /// Typed data of the first `box_type` under the subtree at `start`.
    pub fn first_data_under(&self, start: usize, box_type: u32) -> Option<&BoxData> {
        self.find_first_under(start, box_type)
            .and_then(|idx| self.nodes[idx].data.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Build a box: 8-byte header + payload.
    pub fn make_box(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(8 + payload.len());
        data.extend_from_slice(&(8 + payload.len() as u32).to_be_bytes());
        data.extend_from_slice(box_type);
        data.extend_from_slice(payload);
        data
    }

    /// Build a box with a 64-bit largesize extension.
    pub fn make_box_ext(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(16 + payload.len());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(box_type);
        data.extend_from_slice(&(16 + payload.len() as u64).to_be_bytes());
        data.extend_from_slice(payload);
        data
    }

    fn parse(bytes: &[u8]) -> BoxTree {
        let len = bytes.len() as u64;
        BoxTree::parse(&mut Cursor::new(bytes), len).unwrap()
    }

    #[test]
    fn read_simple_header() {
        let data = make_box(b"ftyp", &[0u8; 12]);
        let mut cur = Cursor::new(&data);
        let h = read_header_at(&mut cur, 0, data.len() as u64)
            .unwrap()
            .unwrap();
        assert_eq!(h.box_type, FTYP);
        assert_eq!(h.size, 20);
        assert_eq!(h.header_size, 8);
        assert_eq!(h.content_offset(), 8);
        assert_eq!(h.content_size(), 12);
    }

    #[test]
    fn read_largesize_header() {
        let data = make_box_ext(b"mdat", &[0u8; 32]);
        let mut cur = Cursor::new(&data);
        let h = read_header_at(&mut cur, 0, data.len() as u64)
            .unwrap()
            .unwrap();
        assert_eq!(h.box_type, MDAT);
        assert_eq!(h.size, 48);
        assert_eq!(h.header_size, 16);
    }

    #[test]
    fn largesize_zero_is_error() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&0u64.to_be_bytes());
        data.extend_from_slice(&[0u8; 16]);
        let mut cur = Cursor::new(&data);
        let len = data.len() as u64;
        assert!(matches!(
            read_header_at(&mut cur, 0, len),
            Err(DemuxError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn short_span_yields_none() {
        let data = [0u8; 5];
        let mut cur = Cursor::new(&data[..]);
        assert!(read_header_at(&mut cur, 0, 5).unwrap().is_none());
    }

    #[test]
    fn tree_nests_and_contains() {
        let hdlr = make_box(b"hdlr", &{
            let mut p = vec![0u8; 8];
            p.extend_from_slice(b"vide");
            p.extend_from_slice(&[0u8; 12]);
            p
        });
        let mdia = make_box(b"mdia", &hdlr);
        let trak = make_box(b"trak", &mdia);
        let moov = make_box(b"moov", &trak);
        let tree = parse(&moov);

        let trak_idx = tree.find_first(TRAK).unwrap();
        let hdlr_idx = tree.find_first(HDLR).unwrap();

        // every child's byte range sits inside its parent's
        for idx in 1..tree.len() {
            let node = tree.node(idx);
            let parent = tree.node(node.parent.unwrap());
            assert!(node.header.offset >= parent.header.content_offset());
            assert!(node.header.end_offset() <= parent.header.end_offset());
        }
        assert_eq!(
            tree.node(hdlr_idx).data,
            Some(BoxData::Handler(TrackKind::Video))
        );
        assert_eq!(tree.ancestor_of_type(hdlr_idx, TRAK), Some(trak_idx));
        assert_eq!(tree.ancestor_of_type(trak_idx, HDLR), None);
    }

    #[test]
    fn unknown_first_child_truncates_subtree() {
        // moov whose payload starts with a plausible-length but unknown box
        let junk = make_box(b"zzzz", &[0u8; 16]);
        let moov = make_box(b"moov", &junk);
        let tree = parse(&moov);
        let moov_idx = tree.find_first(MOOV).unwrap();
        assert!(tree.node(moov_idx).children.is_empty());
    }

    #[test]
    fn unknown_later_sibling_kept_as_generic() {
        let mut payload = make_box(b"mvhd", &mvhd_v0_payload(1000, 5000));
        payload.extend_from_slice(&make_box(b"zzzz", &[0u8; 4]));
        let moov = make_box(b"moov", &payload);
        let tree = parse(&moov);
        let moov_idx = tree.find_first(MOOV).unwrap();
        assert_eq!(tree.node(moov_idx).children.len(), 2);
    }

    #[test]
    fn child_overrunning_parent_is_rejected() {
        // inner box declares 100 bytes but parent only holds 20
        let mut inner = Vec::new();
        inner.extend_from_slice(&100u32.to_be_bytes());
        inner.extend_from_slice(b"free");
        inner.extend_from_slice(&[0u8; 12]);
        let moov = make_box(b"moov", &inner);
        let tree = parse(&moov);
        let moov_idx = tree.find_first(MOOV).unwrap();
        assert!(tree.node(moov_idx).children.is_empty());
    }

    #[test]
    fn stsd_calibration_reaches_sample_entry() {
        let avcc = make_box(b"avcC", &[1, 0x64, 0, 0x1F, 0xFF]);
        let avc1 = make_box(b"avc1", &{
            let mut p = vec![0u8; 24];
            p.extend_from_slice(&750u16.to_be_bytes()); // width
            p.extend_from_slice(&1334u16.to_be_bytes()); // height
            p.extend_from_slice(&[0u8; 50]); // rest of the fixed entry
            p.extend_from_slice(&avcc);
            p
        });
        let stsd = make_box(b"stsd", &{
            let mut p = vec![0, 0, 0, 0, 0, 0, 0, 1]; // version/flags + entry count
            p.extend_from_slice(&avc1);
            p
        });
        let tree = parse(&stsd);

        let avc1_idx = tree.find_first(AVC1).unwrap();
        assert_eq!(
            tree.node(avc1_idx).data,
            Some(BoxData::VisualSampleEntry {
                codec: VideoCodec::H264,
                width: 750,
                height: 1334,
            })
        );
        let avcc_idx = tree.find_first(AVCC).unwrap();
        assert_eq!(tree.node(avcc_idx).parent, Some(avc1_idx));
    }

    fn mvhd_v0_payload(timescale: u32, duration: u32) -> Vec<u8> {
        let mut p = vec![0u8; 12]; // version/flags + creation/modification
        p.extend_from_slice(&timescale.to_be_bytes());
        p.extend_from_slice(&duration.to_be_bytes());
        p.extend_from_slice(&[0u8; 80]);
        p
    }

    #[test]
    fn mvhd_versions() {
        let v0 = decode_mvhd(&mvhd_v0_payload(600, 3600)).unwrap();
        assert_eq!(
            v0,
            BoxData::MovieHeader {
                timescale: 600,
                duration: 3600
            }
        );

        let mut v1 = vec![1u8, 0, 0, 0];
        v1.extend_from_slice(&[0u8; 16]); // 64-bit creation/modification
        v1.extend_from_slice(&90000u32.to_be_bytes());
        v1.extend_from_slice(&(u64::from(u32::MAX) + 10).to_be_bytes());
        assert_eq!(
            decode_mvhd(&v1).unwrap(),
            BoxData::MovieHeader {
                timescale: 90000,
                duration: u64::from(u32::MAX) + 10
            }
        );
    }

    #[test]
    fn stsz_default_and_explicit() {
        // explicit sizes
        let mut p = vec![0u8; 4];
        p.extend_from_slice(&0u32.to_be_bytes());
        p.extend_from_slice(&3u32.to_be_bytes());
        for s in [100u32, 200, 300] {
            p.extend_from_slice(&s.to_be_bytes());
        }
        assert_eq!(
            decode_stsz(&p),
            BoxData::SampleSizes {
                default_size: 0,
                count: 3,
                sizes: vec![100, 200, 300]
            }
        );

        // global size, no per-sample list
        let mut p = vec![0u8; 4];
        p.extend_from_slice(&512u32.to_be_bytes());
        p.extend_from_slice(&10u32.to_be_bytes());
        assert_eq!(
            decode_stsz(&p),
            BoxData::SampleSizes {
                default_size: 512,
                count: 10,
                sizes: vec![]
            }
        );
    }

    #[test]
    fn short_payloads_decode_empty() {
        assert_eq!(
            decode_stsz(&[0, 0]),
            BoxData::SampleSizes {
                default_size: 0,
                count: 0,
                sizes: vec![]
            }
        );
        assert_eq!(decode_stsc(&[0u8; 6]), BoxData::ChunkRuns(vec![]));
        assert_eq!(decode_stts(&[]), BoxData::TimeRuns(vec![]));
        assert!(decode_hdlr(&[0u8; 10]).is_none());
        assert!(decode_mvhd(&[0u8; 14]).is_none());
    }

    #[test]
    fn stsz_truncated_size_list_stops_short() {
        // declares 4 sizes, payload only holds 2
        let mut p = vec![0u8; 4];
        p.extend_from_slice(&0u32.to_be_bytes());
        p.extend_from_slice(&4u32.to_be_bytes());
        p.extend_from_slice(&10u32.to_be_bytes());
        p.extend_from_slice(&20u32.to_be_bytes());
        let BoxData::SampleSizes { sizes, count, .. } = decode_stsz(&p) else {
            panic!("wrong variant");
        };
        assert_eq!(count, 4);
        assert_eq!(sizes, vec![10, 20]);
    }

    #[test]
    fn ctts_expands_runs() {
        let mut p = vec![0u8; 4];
        p.extend_from_slice(&2u32.to_be_bytes());
        p.extend_from_slice(&3u32.to_be_bytes()); // 3 samples
        p.extend_from_slice(&100u32.to_be_bytes()); // offset 100
        p.extend_from_slice(&1u32.to_be_bytes()); // 1 sample
        p.extend_from_slice(&0u32.to_be_bytes()); // offset 0
        assert_eq!(
            decode_ctts(&p),
            BoxData::CompositionOffsets(vec![100, 100, 100, 0])
        );
    }

    #[test]
    fn stss_converts_to_zero_based() {
        let mut p = vec![0u8; 4];
        p.extend_from_slice(&3u32.to_be_bytes());
        for n in [1u32, 31, 61] {
            p.extend_from_slice(&n.to_be_bytes());
        }
        assert_eq!(decode_stss(&p), BoxData::SyncSamples(vec![0, 30, 60]));
    }

    #[test]
    fn co64_reads_wide_offsets() {
        let mut p = vec![0u8; 4];
        p.extend_from_slice(&2u32.to_be_bytes());
        p.extend_from_slice(&0x1_0000_0000u64.to_be_bytes());
        p.extend_from_slice(&0x2_0000_0000u64.to_be_bytes());
        assert_eq!(
            decode_chunk_offsets(&p, true),
            BoxData::ChunkOffsets(vec![0x1_0000_0000, 0x2_0000_0000])
        );
    }
}
