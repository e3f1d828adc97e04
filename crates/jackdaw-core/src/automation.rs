//! Parameter automation
//!
//! An [`Automation`] is a piecewise-linear curve over sample-frame positions,
//! stored as strictly ordered [`Keyframe`]s. Each keyframe caches the slope to
//! its successor so sampling the curve is one lookup plus one multiply-add.
//!
//! Two modes, never both active:
//! - **read**: the mixdown samples the curve every chunk and pushes the result
//!   through the bound endpoint
//! - **write**: endpoint writes are recorded as keyframes at the playhead
//!
//! The keyframe array sits behind a mutex because the main thread inserts
//! while the DSP thread samples. The lock is held for a single lookup or
//! insert, never across a chunk. The DSP thread only reaches it through
//! [`Automation::try_get_value`], [`Automation::try_fill`] and
//! [`Automation::try_record`], so it never waits; a write pass reserves
//! keyframe room up front so recording rarely allocates.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::dsp::delay::{DELAY_MAX_AMP, DELAY_MAX_MSEC};
use crate::endpoint::{ValType, Value};

/// Largest absolute play speed an automation may request
pub const MAX_PLAY_SPEED: f32 = 5.0;

/// Keyframe slots reserved when a write pass starts
const RECORD_RESERVE: usize = 1024;

/// Parameter an automation drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AutomationType {
    Vol,
    Pan,
    FirCutoff,
    FirBandwidth,
    DelTime,
    DelAmp,
    PlaySpeed,
}

impl AutomationType {
    pub const ALL: [AutomationType; 7] = [
        AutomationType::Vol,
        AutomationType::Pan,
        AutomationType::FirCutoff,
        AutomationType::FirBandwidth,
        AutomationType::DelTime,
        AutomationType::DelAmp,
        AutomationType::PlaySpeed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AutomationType::Vol => "Volume",
            AutomationType::Pan => "Pan",
            AutomationType::FirCutoff => "FIR Filter cutoff",
            AutomationType::FirBandwidth => "FIR Filter bandwidth",
            AutomationType::DelTime => "Delay time",
            AutomationType::DelAmp => "Delay amplitude",
            AutomationType::PlaySpeed => "Play speed",
        }
    }

    /// Type of the driven value
    pub fn val_type(&self) -> ValType {
        match self {
            AutomationType::Vol | AutomationType::Pan | AutomationType::PlaySpeed => ValType::Float,
            AutomationType::FirCutoff | AutomationType::FirBandwidth | AutomationType::DelAmp => {
                ValType::Double
            }
            AutomationType::DelTime => ValType::Int,
        }
    }

    /// Inclusive value range
    pub fn range(&self) -> (Value, Value) {
        match self {
            AutomationType::Vol => (Value::Float(0.0), Value::Float(3.0)),
            AutomationType::Pan => (Value::Float(0.0), Value::Float(1.0)),
            AutomationType::FirCutoff | AutomationType::FirBandwidth => {
                (Value::Double(0.0), Value::Double(1.0))
            }
            AutomationType::DelTime => (Value::Int(0), Value::Int(DELAY_MAX_MSEC)),
            AutomationType::DelAmp => (Value::Double(0.0), Value::Double(DELAY_MAX_AMP)),
            AutomationType::PlaySpeed => (Value::Float(-MAX_PLAY_SPEED), Value::Float(MAX_PLAY_SPEED)),
        }
    }
}

/// One vertex of the curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    /// Absolute position in sample-frames
    pub pos: i32,
    pub value: Value,
    /// Change in value per sample-frame towards the next keyframe
    pub m_fwd: f64,
}

impl Keyframe {
    fn value_at(&self, pos: i32) -> f64 {
        self.value.to_f64() + self.m_fwd * (pos as f64 - self.pos as f64)
    }
}

/// Current mode, stored as one byte so read and write cannot both be set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AutomationMode {
    Off = 0,
    Read = 1,
    Write = 2,
}

impl AutomationMode {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => AutomationMode::Read,
            2 => AutomationMode::Write,
            _ => AutomationMode::Off,
        }
    }
}

#[derive(Default)]
struct Keyframes {
    frames: Vec<Keyframe>,
    /// Index of the segment used by the last lookup
    current: Option<usize>,
    /// Position of the previous recorded keyframe in this write pass
    last_record: Option<i32>,
}

impl Keyframes {
    /// Index of the last keyframe at or before `pos`, or the first keyframe
    /// when `pos` precedes the curve
    fn segment(&mut self, pos: i32) -> Option<usize> {
        if self.frames.is_empty() {
            return None;
        }
        if let Some(i) = self.current {
            let starts_before = self.frames.get(i).is_some_and(|k| k.pos <= pos);
            let ends_after = self.frames.get(i + 1).map_or(true, |k| k.pos > pos);
            if starts_before && ends_after {
                return Some(i);
            }
        }
        let idx = self.frames.partition_point(|k| k.pos <= pos).saturating_sub(1);
        self.current = Some(idx);
        Some(idx)
    }

    fn recalc_slope(&mut self, idx: usize) {
        let next = self.frames.get(idx + 1).copied();
        if let Some(k) = self.frames.get_mut(idx) {
            k.m_fwd = match next {
                Some(n) => (n.value.to_f64() - k.value.to_f64()) / (n.pos - k.pos) as f64,
                None => 0.0,
            };
        }
    }

    fn insert(&mut self, pos: i32, value: Value) -> usize {
        let idx = match self.frames.binary_search_by_key(&pos, |k| k.pos) {
            Ok(i) => {
                self.frames[i].value = value;
                i
            }
            Err(i) => {
                self.frames.insert(
                    i,
                    Keyframe {
                        pos,
                        value,
                        m_fwd: 0.0,
                    },
                );
                self.current = None;
                i
            }
        };
        self.recalc_slope(idx);
        if idx > 0 {
            self.recalc_slope(idx - 1);
        }
        idx
    }

    fn record(&mut self, pos: i32, value: Value) {
        if let Some(prev) = self.last_record {
            let (lo, hi) = if prev <= pos { (prev, pos) } else { (pos, prev) };
            let before = self.frames.len();
            self.frames.retain(|k| k.pos <= lo || k.pos >= hi);
            if self.frames.len() != before {
                self.current = None;
            }
        }
        // insert recomputes the slopes on both sides of the gap
        self.insert(pos, value);
        self.last_record = Some(pos);
    }

    fn remove_at(&mut self, idx: usize) -> Keyframe {
        let k = self.frames.remove(idx);
        self.current = None;
        if idx > 0 {
            self.recalc_slope(idx - 1);
        }
        k
    }
}

/// Automation curve for one parameter
pub struct Automation {
    kind: AutomationType,
    min: Value,
    max: Value,
    mode: AtomicU8,
    keyframes: Mutex<Keyframes>,
}

impl std::fmt::Debug for Automation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Automation")
            .field("kind", &self.kind)
            .field("mode", &self.mode())
            .field("keyframes", &self.len())
            .finish()
    }
}

impl Automation {
    pub fn new(kind: AutomationType) -> Self {
        let (min, max) = kind.range();
        Self {
            kind,
            min,
            max,
            mode: AtomicU8::new(AutomationMode::Off as u8),
            keyframes: Mutex::new(Keyframes::default()),
        }
    }

    pub fn kind(&self) -> AutomationType {
        self.kind
    }

    pub fn val_type(&self) -> ValType {
        self.kind.val_type()
    }

    pub fn range(&self) -> (Value, Value) {
        (self.min, self.max)
    }

    fn lock(&self) -> MutexGuard<'_, Keyframes> {
        self.keyframes.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all keyframes
    pub fn keyframes(&self) -> Vec<Keyframe> {
        self.lock().frames.clone()
    }

    fn coerce(&self, value: Value) -> Value {
        let value = value.cast(self.val_type());
        if value.less_than(self.min) {
            self.min
        } else if self.max.less_than(value) {
            self.max
        } else {
            value
        }
    }

    /// Insert a keyframe, replacing one already at `pos`
    ///
    /// The value is converted to the automation's type and clamped to its
    /// range. Returns the keyframe's index.
    pub fn insert(&self, pos: i32, value: Value) -> usize {
        let value = self.coerce(value);
        self.lock().insert(pos, value)
    }

    /// Remove the keyframe at exactly `pos`
    pub fn remove(&self, pos: i32) -> Option<Keyframe> {
        let mut kfs = self.lock();
        let idx = kfs.frames.binary_search_by_key(&pos, |k| k.pos).ok()?;
        Some(kfs.remove_at(idx))
    }

    pub fn clear(&self) {
        let mut kfs = self.lock();
        kfs.frames.clear();
        kfs.current = None;
        kfs.last_record = None;
    }

    /// Keyframe starting the segment that contains `pos`
    pub fn get_segment(&self, pos: i32) -> Option<Keyframe> {
        let mut kfs = self.lock();
        let idx = kfs.segment(pos)?;
        Some(kfs.frames[idx])
    }

    /// Keyframe cached by the most recent lookup
    pub fn current(&self) -> Option<Keyframe> {
        let kfs = self.lock();
        kfs.current.and_then(|i| kfs.frames.get(i).copied())
    }

    fn sample(kfs: &mut Keyframes, pos: i32, ty: ValType) -> Option<Value> {
        let idx = kfs.segment(pos)?;
        let k = kfs.frames[idx];
        if pos <= k.pos {
            return Some(k.value);
        }
        Some(Value::from_f64(ty, k.value_at(pos)))
    }

    /// Curve value at `pos`
    ///
    /// Linear between keyframes; before the first and after the last the end
    /// values hold. `None` when there are no keyframes.
    pub fn get_value(&self, pos: i32) -> Option<Value> {
        let ty = self.val_type();
        Self::sample(&mut self.lock(), pos, ty)
    }

    /// Like [`Automation::get_value`] but gives up instead of waiting for the
    /// keyframe lock
    pub fn try_get_value(&self, pos: i32) -> Option<Value> {
        let ty = self.val_type();
        let mut kfs = self.keyframes.try_lock().ok()?;
        Self::sample(&mut kfs, pos, ty)
    }

    /// Sample the curve at `start`, `start + step`, ... into `out` under a
    /// single non-blocking lock
    ///
    /// Returns false, leaving `out` untouched, when the lock is busy or the
    /// curve is empty.
    pub fn try_fill(&self, start: i32, step: f32, out: &mut [f32]) -> bool {
        let ty = self.val_type();
        let Ok(mut kfs) = self.keyframes.try_lock() else {
            return false;
        };
        if kfs.frames.is_empty() {
            return false;
        }
        let mut pos = start as f64;
        for v in out.iter_mut() {
            if let Some(value) = Self::sample(&mut kfs, pos.round() as i32, ty) {
                *v = value.as_f32();
            }
            pos += step as f64;
        }
        true
    }

    pub fn mode(&self) -> AutomationMode {
        AutomationMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_read(&self) -> bool {
        self.mode() == AutomationMode::Read
    }

    #[inline]
    pub fn is_write(&self) -> bool {
        self.mode() == AutomationMode::Write
    }

    /// Enable or disable read mode; enabling it leaves write mode
    pub fn set_read(&self, read: bool) {
        if read {
            self.mode.store(AutomationMode::Read as u8, Ordering::Release);
            self.lock().last_record = None;
        } else {
            let _ = self.mode.compare_exchange(
                AutomationMode::Read as u8,
                AutomationMode::Off as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    /// Enable or disable write mode; enabling it leaves read mode
    ///
    /// Each enable starts a new recording pass.
    pub fn set_write(&self, write: bool) {
        if write {
            self.mode.store(AutomationMode::Write as u8, Ordering::Release);
            self.lock().frames.reserve(RECORD_RESERVE);
        } else {
            let _ = self.mode.compare_exchange(
                AutomationMode::Write as u8,
                AutomationMode::Off as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        self.lock().last_record = None;
    }

    /// Record a value during a write pass
    ///
    /// Keyframes strictly between the previous recorded position and `pos`
    /// are overwritten, so sweeping a control over existing automation
    /// replaces it.
    pub fn record(&self, pos: i32, value: Value) {
        let value = self.coerce(value);
        self.lock().record(pos, value);
    }

    /// [`Automation::record`] without waiting for the keyframe lock
    ///
    /// Returns false, dropping the value, when the lock is held elsewhere.
    /// Used from endpoint writes, which may run on the DSP thread.
    pub fn try_record(&self, pos: i32, value: Value) -> bool {
        let value = self.coerce(value);
        let Ok(mut kfs) = self.keyframes.try_lock() else {
            return false;
        };
        kfs.record(pos, value);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Endpoint, Session, ThreadId, WriteFlags};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn vol() -> Automation {
        Automation::new(AutomationType::Vol)
    }

    #[test]
    fn test_types_and_ranges() {
        assert_eq!(AutomationType::DelTime.val_type(), ValType::Int);
        assert_eq!(AutomationType::FirCutoff.val_type(), ValType::Double);
        for kind in AutomationType::ALL {
            let (min, max) = kind.range();
            assert_eq!(min.val_type(), kind.val_type());
            assert!(min.less_than(max), "{:?}", kind);
        }
    }

    #[test]
    fn test_try_fill_per_sample() {
        let a = vol();
        let mut out = [9.0f32; 4];
        assert!(!a.try_fill(0, 1.0, &mut out));
        assert_eq!(out, [9.0; 4]);

        a.insert(0, Value::Float(0.0));
        a.insert(10, Value::Float(1.0));
        assert!(a.try_fill(2, 2.0, &mut out));
        assert_relative_eq!(out[0], 0.2);
        assert_relative_eq!(out[1], 0.4);
        assert_relative_eq!(out[3], 0.8);

        // Backwards playback walks the curve in reverse
        assert!(a.try_fill(12, -4.0, &mut out));
        assert_relative_eq!(out[0], 1.0);
        assert_relative_eq!(out[1], 0.8);
        assert_relative_eq!(out[3], 0.0);
    }

    #[test]
    fn test_linear_interpolation_and_clamped_ends() {
        let a = vol();
        assert_eq!(a.get_value(0), None);
        a.insert(100, Value::Float(0.0));
        a.insert(200, Value::Float(1.0));
        assert_relative_eq!(a.get_value(150).unwrap().as_f32(), 0.5);
        assert_relative_eq!(a.get_value(125).unwrap().as_f32(), 0.25);
        assert_eq!(a.get_value(0), Some(Value::Float(0.0)));
        assert_eq!(a.get_value(5000), Some(Value::Float(1.0)));
    }

    #[test]
    fn test_insert_keeps_order_and_slopes() {
        let a = vol();
        a.insert(300, Value::Float(1.0));
        a.insert(100, Value::Float(0.0));
        a.insert(200, Value::Float(2.0));
        let kfs = a.keyframes();
        let positions: Vec<i32> = kfs.iter().map(|k| k.pos).collect();
        assert_eq!(positions, vec![100, 200, 300]);
        assert_relative_eq!(kfs[0].m_fwd, 0.02);
        assert_relative_eq!(kfs[1].m_fwd, -0.01);
        assert_eq!(kfs[2].m_fwd, 0.0);
    }

    #[test]
    fn test_insert_same_pos_replaces() {
        let a = vol();
        a.insert(0, Value::Float(0.0));
        a.insert(100, Value::Float(1.0));
        a.insert(100, Value::Float(2.0));
        assert_eq!(a.len(), 2);
        assert_relative_eq!(a.keyframes()[0].m_fwd, 0.02);
    }

    #[test]
    fn test_insert_clamps_and_casts() {
        let a = vol();
        a.insert(0, Value::Double(10.0));
        assert_eq!(a.get_value(0), Some(Value::Float(3.0)));
        let d = Automation::new(AutomationType::DelTime);
        d.insert(0, Value::Float(12.6));
        assert_eq!(d.get_value(0), Some(Value::Int(13)));
    }

    #[test]
    fn test_remove_recomputes_slope() {
        let a = vol();
        a.insert(0, Value::Float(0.0));
        a.insert(50, Value::Float(3.0));
        a.insert(100, Value::Float(1.0));
        assert!(a.remove(50).is_some());
        assert!(a.remove(50).is_none());
        assert_relative_eq!(a.keyframes()[0].m_fwd, 0.01);
    }

    #[test]
    fn test_segment_and_current_cursor() {
        let a = vol();
        for pos in [0, 100, 200] {
            a.insert(pos, Value::Float(0.0));
        }
        assert_eq!(a.get_segment(150).unwrap().pos, 100);
        assert_eq!(a.current().unwrap().pos, 100);
        assert_eq!(a.get_segment(-10).unwrap().pos, 0);
        assert_eq!(a.get_segment(200).unwrap().pos, 200);
    }

    #[test]
    fn test_modes_are_exclusive() {
        let a = vol();
        a.set_read(true);
        assert!(a.is_read() && !a.is_write());
        a.set_write(true);
        assert!(a.is_write() && !a.is_read());
        // disabling read while writing leaves write on
        a.set_read(false);
        assert!(a.is_write());
        a.set_write(false);
        assert_eq!(a.mode(), AutomationMode::Off);
    }

    #[test]
    fn test_record_overwrites_swept_keyframes() {
        let a = vol();
        a.insert(150, Value::Float(2.0));
        a.insert(500, Value::Float(2.0));
        a.set_write(true);
        a.record(100, Value::Float(0.5));
        a.record(200, Value::Float(0.5));
        let positions: Vec<i32> = a.keyframes().iter().map(|k| k.pos).collect();
        assert_eq!(positions, vec![100, 200, 500]);
        assert_relative_eq!(a.get_value(150).unwrap().as_f32(), 0.5);
    }

    #[test]
    fn test_endpoint_write_records_at_playhead() {
        let session = Session::new();
        let automation = Arc::new(vol());
        let ep = Endpoint::builder("vol", "Volume", 1.0f32, ThreadId::Main)
            .with_range(0.0f32, 3.0f32)
            .build();
        assert!(ep.bind_automation(Arc::clone(&automation)));
        automation.set_write(true);

        session.set_playhead(4800);
        ep.write(&session, ThreadId::Main, Value::Float(0.7), WriteFlags::NONE)
            .unwrap();
        assert_eq!(automation.get_value(4800), Some(Value::Float(0.7)));

        automation.set_read(true);
        ep.write(&session, ThreadId::Main, Value::Float(0.2), WriteFlags::NONE)
            .unwrap();
        assert_eq!(automation.len(), 1);
    }

    #[test]
    fn test_try_record_drops_under_contention() {
        let a = vol();
        a.set_write(true);
        let guard = a.keyframes.lock().unwrap();
        assert!(!a.try_record(100, Value::Float(0.5)));
        drop(guard);
        assert!(a.is_empty());
        assert!(a.try_record(100, Value::Float(0.5)));
        assert_eq!(a.get_value(100), Some(Value::Float(0.5)));
    }

    #[test]
    fn test_try_get_value_under_contention() {
        let a = vol();
        a.insert(0, Value::Float(1.0));
        let guard = a.keyframes.lock().unwrap();
        assert_eq!(a.try_get_value(0), None);
        drop(guard);
        assert_eq!(a.try_get_value(0), Some(Value::Float(1.0)));
    }
}
