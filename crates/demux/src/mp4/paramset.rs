//! Out-of-band parameter set extraction from avcC/hvcC configuration records.

use fc_common::{DemuxError, VideoCodec};
use tracing::{debug, warn};

const NAL_H264_SPS: u8 = 7;
const NAL_H264_PPS: u8 = 8;
const NAL_H265_VPS: u8 = 32;
const NAL_H265_SPS: u8 = 33;
const NAL_H265_PPS: u8 = 34;

/// Raw codec parameter sets, required before any decode request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSets {
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
    /// H.265 only.
    pub vps: Option<Vec<u8>>,
}

impl ParameterSets {
    /// Extract parameter sets from a decoder configuration record payload.
    /// Missing SPS or PPS after extraction is fatal for the file.
    pub fn extract(codec: VideoCodec, payload: &[u8]) -> Result<Self, DemuxError> {
        let sets = match codec {
            VideoCodec::H264 => extract_avcc(payload)?,
            VideoCodec::H265 => extract_hvcc(payload),
        };
        if sets.sps.is_empty() || sets.pps.is_empty() {
            return Err(DemuxError::UnsupportedSampleEntry(format!(
                "{} configuration record carries no SPS/PPS",
                codec.display_name()
            )));
        }
        debug!(
            codec = codec.display_name(),
            sps_len = sets.sps.len(),
            pps_len = sets.pps.len(),
            has_vps = sets.vps.is_some(),
            "extracted parameter sets"
        );
        Ok(sets)
    }
}

fn invalid(at: usize, reason: &str) -> DemuxError {
    DemuxError::InvalidStructure {
        offset: at as u64,
        reason: reason.into(),
    }
}

/// avcC: fixed 6-byte prefix, then length-prefixed SPS entries (NAL type 7)
/// followed by a count byte and length-prefixed PPS entries (NAL type 8).
/// A type mismatch or a length overrunning the payload is a hard error.
fn extract_avcc(p: &[u8]) -> Result<ParameterSets, DemuxError> {
    let num_sps = (*p.get(5).ok_or_else(|| invalid(5, "record too short"))? & 0x1F) as usize;
    let mut at = 6;
    let mut sps = Vec::new();

    for _ in 0..num_sps {
        let entry = read_prefixed(p, at)?;
        let nal_type = entry.first().copied().unwrap_or(0) & 0x1F;
        if nal_type != NAL_H264_SPS {
            return Err(invalid(at, "SPS entry has wrong NAL unit type"));
        }
        if sps.is_empty() {
            sps = entry.to_vec();
        }
        at += 2 + entry.len();
    }

    let num_pps = *p
        .get(at)
        .ok_or_else(|| invalid(at, "missing PPS count"))? as usize;
    at += 1;
    let mut pps = Vec::new();

    for _ in 0..num_pps {
        let entry = read_prefixed(p, at)?;
        let nal_type = entry.first().copied().unwrap_or(0) & 0x1F;
        if nal_type != NAL_H264_PPS {
            return Err(invalid(at, "PPS entry has wrong NAL unit type"));
        }
        if pps.is_empty() {
            pps = entry.to_vec();
        }
        at += 2 + entry.len();
    }

    Ok(ParameterSets {
        sps,
        pps,
        vps: None,
    })
}

/// hvcC: 22-byte fixed prefix, then a count of typed NAL arrays. Each array:
/// one type byte (low 6 bits), a 16-bit entry count, and that many
/// length-prefixed entries. An overrun stops extraction without failing.
fn extract_hvcc(p: &[u8]) -> ParameterSets {
    let mut sets = ParameterSets::default();
    let Some(&num_arrays) = p.get(22) else {
        return sets;
    };
    let mut at = 23;

    'arrays: for _ in 0..num_arrays {
        let Some(&type_byte) = p.get(at) else {
            break;
        };
        let nal_type = type_byte & 0x3F;
        let Some(count) = read_u16(p, at + 1) else {
            break;
        };
        at += 3;

        for _ in 0..count {
            let Ok(entry) = read_prefixed(p, at) else {
                warn!(at, "hvcC entry overruns payload, stopping extraction");
                break 'arrays;
            };
            let slot = match nal_type {
                NAL_H265_VPS => {
                    if sets.vps.is_none() {
                        sets.vps = Some(entry.to_vec());
                    }
                    None
                }
                NAL_H265_SPS => Some(&mut sets.sps),
                NAL_H265_PPS => Some(&mut sets.pps),
                _ => None,
            };
            if let Some(slot) = slot {
                if slot.is_empty() {
                    *slot = entry.to_vec();
                }
            }
            at += 2 + entry.len();
        }
    }
    sets
}

fn read_u16(p: &[u8], at: usize) -> Option<u16> {
    p.get(at..at + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

/// Read one u16-length-prefixed entry at `at`.
fn read_prefixed(p: &[u8], at: usize) -> Result<&[u8], DemuxError> {
    let len = read_u16(p, at).ok_or_else(|| invalid(at, "missing length prefix"))? as usize;
    p.get(at + 2..at + 2 + len)
        .ok_or_else(|| invalid(at, "entry length overruns payload"))
}
