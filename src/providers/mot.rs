//! Provider for Multiple-Object-Tracking (MOT) text files.
//!
//! Each line of the file describes one detection:
//!
//! ```text
//! frame,track_id,bb_left,bb_top,bb_width,bb_height,confidence[,x,y[,z]]
//! ```
//!
//! Opening a file scans it once and records the byte offset of every line
//! per frame, so loading a frame seeks straight to its detections instead
//! of rescanning. A small bounded cache of recently loaded frames sits in
//! front of the file to absorb repeated loads.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    fs::File,
    io::{self, BufRead, BufReader, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use thiserror::Error;

use crate::{BoxError, DataProvider, EstimateSize, Key};

/// A single detection row.
#[derive(Debug, Clone, PartialEq)]
pub struct MotDetection {
    pub frame: i64,
    pub track_id: i64,
    pub bb_left: f64,
    pub bb_top: f64,
    pub bb_width: f64,
    pub bb_height: f64,
    pub confidence: f64,
    /// World coordinates; 0 when the file does not carry them.
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// All detections of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MotFrame {
    pub frame_number: i64,
    pub detections: Vec<MotDetection>,
}

impl MotFrame {
    fn empty(frame_number: i64) -> Self {
        Self {
            frame_number,
            detections: Vec::new(),
        }
    }
}

impl EstimateSize for MotFrame {
    fn estimated_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.detections.len() * std::mem::size_of::<MotDetection>()
    }
}

/// Errors from the MOT provider.
#[derive(Debug, Error)]
pub enum MotError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid detection line: {0:?}")]
    InvalidLine(String),
}

/// Bounded map of recently loaded frames with least-recently-used eviction.
#[derive(Debug)]
struct FrameCache {
    capacity: usize,
    frames: HashMap<Key, MotFrame>,
    order: VecDeque<Key>,
}

impl FrameCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            frames: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    fn get(&mut self, frame: Key) -> Option<MotFrame> {
        let data = self.frames.get(&frame).cloned()?;
        self.order.retain(|&k| k != frame);
        self.order.push_back(frame);
        Some(data)
    }

    fn insert(&mut self, frame: Key, data: MotFrame) {
        if self.capacity == 0 {
            return;
        }
        if !self.frames.contains_key(&frame) && self.frames.len() >= self.capacity {
            if let Some(lru) = self.order.pop_front() {
                self.frames.remove(&lru);
            }
        }
        self.order.retain(|&k| k != frame);
        self.order.push_back(frame);
        self.frames.insert(frame, data);
    }

    fn len(&self) -> usize {
        self.frames.len()
    }

    fn clear(&mut self) {
        self.frames.clear();
        self.order.clear();
    }
}

/// State behind the provider's own lock: the open file and the frame cache.
#[derive(Debug)]
struct ProviderState {
    reader: BufReader<File>,
    cache: FrameCache,
    hits: u64,
    misses: u64,
}

/// [`DataProvider`] over a MOT text file.
pub struct MotDataProvider {
    path: PathBuf,
    index: BTreeMap<Key, Vec<u64>>,
    state: Mutex<ProviderState>,
}

impl MotDataProvider {
    /// Open `path` and index it. `cache_size` bounds the internal
    /// recently-loaded-frames cache; 0 disables it.
    pub fn open(path: impl AsRef<Path>, cache_size: usize) -> Result<Self, MotError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| MotError::Io {
            path: path.clone(),
            source,
        };

        let mut reader = BufReader::new(File::open(&path).map_err(io_err)?);
        let mut index: BTreeMap<Key, Vec<u64>> = BTreeMap::new();
        let mut offset = 0u64;
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader.read_line(&mut line).map_err(io_err)?;
            if read == 0 {
                break;
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                match trimmed.split(',').next().and_then(|f| f.trim().parse::<i64>().ok()) {
                    Some(frame) => index.entry(frame).or_default().push(offset),
                    None => tracing::debug!(line = trimmed, "skipping unindexable line"),
                }
            }
            offset += read as u64;
        }
        tracing::debug!(path = %path.display(), frames = index.len(), "indexed MOT file");

        Ok(Self {
            path,
            index,
            state: Mutex::new(ProviderState {
                reader,
                cache: FrameCache::new(cache_size),
                hits: 0,
                misses: 0,
            }),
        })
    }

    /// Load one frame. Frames absent from the index yield an empty
    /// [`MotFrame`]; malformed detection lines are skipped.
    pub fn load_frame(&self, frame: Key) -> Result<MotFrame, MotError> {
        let mut state = self.state.lock();
        if let Some(cached) = state.cache.get(frame) {
            state.hits += 1;
            return Ok(cached);
        }
        state.misses += 1;

        let io_err = |source| MotError::Io {
            path: self.path.clone(),
            source,
        };
        let mut detections = Vec::new();
        if let Some(offsets) = self.index.get(&frame) {
            let mut line = String::new();
            for &offset in offsets {
                state
                    .reader
                    .seek(SeekFrom::Start(offset))
                    .map_err(io_err)?;
                line.clear();
                state.reader.read_line(&mut line).map_err(io_err)?;
                match parse_detection_line(&line) {
                    Ok(detection) => detections.push(detection),
                    Err(_) => {
                        tracing::debug!(frame, line = line.trim(), "skipping malformed detection")
                    }
                }
            }
        }

        let data = MotFrame {
            frame_number: frame,
            detections,
        };
        state.cache.insert(frame, data.clone());
        Ok(data)
    }

    /// Load several frames through the same cache.
    pub fn load_batch(&self, frames: &[Key]) -> Result<HashMap<Key, MotFrame>, MotError> {
        frames
            .iter()
            .map(|&frame| Ok((frame, self.load_frame(frame)?)))
            .collect()
    }

    /// Drop all cached frames.
    pub fn clear_cache(&self) {
        self.state.lock().cache.clear();
    }
}

impl DataProvider for MotDataProvider {
    type Value = MotFrame;

    fn load(&self, key: Key) -> Result<MotFrame, BoxError> {
        self.load_frame(key).map_err(Into::into)
    }

    fn available_keys(&self) -> HashSet<Key> {
        self.index.keys().copied().collect()
    }

    fn total_keys(&self) -> usize {
        self.index.len()
    }

    fn stats(&self) -> HashMap<String, f64> {
        let state = self.state.lock();
        let lookups = state.hits + state.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            state.hits as f64 / lookups as f64
        };
        HashMap::from([
            ("total_frames".to_string(), self.index.len() as f64),
            ("cache_hits".to_string(), state.hits as f64),
            ("cache_misses".to_string(), state.misses as f64),
            ("cache_hit_rate".to_string(), hit_rate),
            ("cache_size".to_string(), state.cache.len() as f64),
        ])
    }
}

/// Parse one detection line. At least seven comma-separated fields are
/// required; the trailing world coordinates are optional.
fn parse_detection_line(line: &str) -> Result<MotDetection, MotError> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() < 7 {
        return Err(MotError::InvalidLine(line.trim().to_string()));
    }
    let invalid = || MotError::InvalidLine(line.trim().to_string());
    let int = |i: usize| fields[i].trim().parse::<i64>().map_err(|_| invalid());
    let num = |i: usize| fields[i].trim().parse::<f64>().map_err(|_| invalid());
    let opt = |i: usize| {
        if i < fields.len() {
            fields[i].trim().parse::<f64>().map_err(|_| invalid())
        } else {
            Ok(0.0)
        }
    };

    Ok(MotDetection {
        frame: int(0)?,
        track_id: int(1)?,
        bb_left: num(2)?,
        bb_top: num(3)?,
        bb_width: num(4)?,
        bb_height: num(5)?,
        confidence: num(6)?,
        x: opt(7)?,
        y: opt(8)?,
        z: opt(9)?,
    })
}
