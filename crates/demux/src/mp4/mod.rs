//! MP4/MOV (ISO BMFF) source.
//!
//! Parses the box tree once at open, then lazily resolves the flat sample
//! table and parameter sets for the primary video track.

pub mod boxes;
pub mod paramset;
pub mod sample;

use std::cell::OnceCell;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use fc_common::{DemuxError, Rational, Resolution, TimeCode, TrackKind, VideoCodec};
use tracing::{info, warn};

use crate::traits::{MediaSource, SourceInfo};
use boxes::{BoxData, BoxTree, AVC1, AVCC, CO64, CTTS, HDLR, HVC1, HVCC, MDHD, MVHD, STCO, STSC,
    STSS, STSZ, STTS, TRAK};
pub use paramset::ParameterSets;
pub use sample::{Sample, SampleTable, SampleTableInput};

const DEFAULT_FPS: u32 = 30;

/// An opened MP4 video source.
#[derive(Debug)]
pub struct Mp4Source<R: Read + Seek> {
    reader: R,
    total_len: u64,
    tree: BoxTree,
    /// Node index of the primary video trak.
    video_trak: usize,
    codec: VideoCodec,
    resolution: Resolution,
    parameter_sets: ParameterSets,
    table: OnceCell<SampleTable>,
    info: OnceCell<SourceInfo>,
}

impl Mp4Source<BufReader<File>> {
    /// Open an MP4 file and parse its structure.
    pub fn open(path: &Path) -> Result<Self, DemuxError> {
        info!("opening MP4 file: {}", path.display());
        let file = File::open(path)?;
        let total_len = file.metadata()?.len();
        Self::from_reader(BufReader::new(file), total_len)
    }
}

impl<R: Read + Seek> Mp4Source<R> {
    /// Parse a source from any byte reader of `total_len` bytes.
    pub fn from_reader(mut reader: R, total_len: u64) -> Result<Self, DemuxError> {
        let tree = BoxTree::parse(&mut reader, total_len)?;

        let video_trak = find_video_trak(&tree).ok_or(DemuxError::NoVideoTrack)?;

        let &BoxData::VisualSampleEntry {
            codec,
            width,
            height,
        } = tree
            .first_data_under(video_trak, AVC1)
            .or_else(|| tree.first_data_under(video_trak, HVC1))
            .ok_or(DemuxError::RequiredBoxMissing { name: "avc1/hvc1" })?
        else {
            return Err(DemuxError::RequiredBoxMissing { name: "avc1/hvc1" });
        };

        let config_name = match codec {
            VideoCodec::H264 => "avcC",
            VideoCodec::H265 => "hvcC",
        };
        let Some(BoxData::CodecConfig(config)) = tree
            .first_data_under(video_trak, AVCC)
            .or_else(|| tree.first_data_under(video_trak, HVCC))
        else {
            return Err(DemuxError::RequiredBoxMissing { name: config_name });
        };
        let parameter_sets = ParameterSets::extract(codec, config)?;

        // the sample tables are required even though resolution is lazy
        for (box_type, name) in [(STSZ, "stsz"), (STSC, "stsc"), (STTS, "stts")] {
            if tree.first_data_under(video_trak, box_type).is_none() {
                return Err(DemuxError::RequiredBoxMissing { name });
            }
        }
        if tree.first_data_under(video_trak, STCO).is_none()
            && tree.first_data_under(video_trak, CO64).is_none()
        {
            return Err(DemuxError::RequiredBoxMissing { name: "stco/co64" });
        }

        info!(
            codec = codec.display_name(),
            width,
            height,
            "opened video track"
        );
        Ok(Self {
            reader,
            total_len,
            tree,
            video_trak,
            codec,
            resolution: Resolution::new(u32::from(width), u32::from(height)),
            parameter_sets,
            table: OnceCell::new(),
            info: OnceCell::new(),
        })
    }

    /// Resolved sample table, computed on first use.
    pub fn table(&self) -> &SampleTable {
        self.table.get_or_init(|| {
            let trak = self.video_trak;
            let (default_size, declared_count, sizes) =
                match self.tree.first_data_under(trak, STSZ) {
                    Some(&BoxData::SampleSizes {
                        default_size,
                        count,
                        ref sizes,
                    }) => (default_size, count, sizes.as_slice()),
                    _ => (0, 0, &[][..]),
                };
            let chunk_runs = match self.tree.first_data_under(trak, STSC) {
                Some(BoxData::ChunkRuns(runs)) => runs.as_slice(),
                _ => &[],
            };
            let chunk_offsets = match self
                .tree
                .first_data_under(trak, STCO)
                .or_else(|| self.tree.first_data_under(trak, CO64))
            {
                Some(BoxData::ChunkOffsets(offsets)) => offsets.as_slice(),
                _ => &[],
            };
            let time_runs = match self.tree.first_data_under(trak, STTS) {
                Some(BoxData::TimeRuns(runs)) => runs.as_slice(),
                _ => &[],
            };
            let composition_offsets = match self.tree.first_data_under(trak, CTTS) {
                Some(BoxData::CompositionOffsets(offsets)) => offsets.as_slice(),
                _ => &[],
            };
            let sync_indices = match self.tree.first_data_under(trak, STSS) {
                Some(BoxData::SyncSamples(indices)) => indices.as_slice(),
                _ => &[],
            };
            SampleTable::build(SampleTableInput {
                default_size,
                declared_count,
                sizes,
                chunk_runs,
                chunk_offsets,
                time_runs,
                composition_offsets,
                sync_indices,
            })
        })
    }

    /// Movie duration in seconds, 0 when the movie header is absent or its
    /// timescale is 0.
    fn duration_secs(&self) -> f64 {
        match self.tree.first_data(MVHD) {
            Some(&BoxData::MovieHeader {
                timescale,
                duration,
            }) if timescale > 0 => duration as f64 / f64::from(timescale),
            _ => 0.0,
        }
    }

    /// Frame rate: sample count over duration, with a fallback of media
    /// timescale over the first time delta when duration is unusable.
    fn derive_fps(&self, sample_count: u32) -> Rational {
        let duration = self.duration_secs();
        if duration.is_finite() && duration > 0.0 {
            let fps = (f64::from(sample_count) / duration).round() as u32;
            if fps > 0 {
                return Rational::new(fps, 1);
            }
        }
        let fallback = self.fps_from_time_runs().unwrap_or(DEFAULT_FPS);
        warn!(fps = fallback, "duration unusable, fps derived from stts");
        Rational::new(fallback, 1)
    }

    fn fps_from_time_runs(&self) -> Option<u32> {
        let &BoxData::MediaHeader { timescale } =
            self.tree.first_data_under(self.video_trak, MDHD)?
        else {
            return None;
        };
        let BoxData::TimeRuns(runs) = self.tree.first_data_under(self.video_trak, STTS)? else {
            return None;
        };
        let delta = runs.first()?.sample_delta;
        if timescale == 0 || delta == 0 {
            return None;
        }
        let fps = (f64::from(timescale) / f64::from(delta)).round() as u32;
        (fps > 0).then_some(fps)
    }
}

/// First trak whose handler marks it as video.
fn find_video_trak(tree: &BoxTree) -> Option<usize> {
    tree.find_all(TRAK).into_iter().find(|&trak| {
        matches!(
            tree.first_data_under(trak, HDLR),
            Some(BoxData::Handler(TrackKind::Video))
        )
    })
}

impl<R: Read + Seek + Send> MediaSource for Mp4Source<R> {
    fn info(&self) -> &SourceInfo {
        self.info.get_or_init(|| {
            let sample_count = self.table().len() as u32;
            SourceInfo {
                codec: self.codec,
                resolution: self.resolution,
                fps: self.derive_fps(sample_count),
                duration: TimeCode::from_secs(self.duration_secs()),
                sample_count,
            }
        })
    }

    fn sample_count(&self) -> u32 {
        self.table().len() as u32
    }

    fn sample(&self, index: u32) -> Option<Sample> {
        self.table().get(index).copied()
    }

    fn read_sample(&mut self, index: u32) -> Result<Option<Vec<u8>>, DemuxError> {
        let Some(sample) = self.table().get(index).copied() else {
            return Ok(None); // past the resolved table: end of stream
        };
        if sample.offset + u64::from(sample.size) > self.total_len {
            warn!(
                index,
                offset = sample.offset,
                size = sample.size,
                "sample byte range outside the file, treating as end of stream"
            );
            return Ok(None);
        }
        let mut data = vec![0u8; sample.size as usize];
        self.reader.seek(SeekFrom::Start(sample.offset))?;
        self.reader.read_exact(&mut data)?;
        Ok(Some(data))
    }

    fn sync_indices(&self) -> &[u32] {
        self.table().sync_indices()
    }

    fn parameter_sets(&self) -> &ParameterSets {
        &self.parameter_sets
    }
}
