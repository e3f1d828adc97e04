//! Timeline track: clip references, volume and pan, automation, effects
//!
//! A track renders one chunk at a time into its own preallocated buffer:
//! 1. read-mode automations are sampled at the chunk start and pushed
//!    through their endpoints
//! 2. every clip reference overlapping the chunk is summed in, scaled per
//!    sample by volume and the linear pan law
//! 3. the effect chain runs over the result

use std::sync::Arc;

use basedrop::Shared;

use crate::automation::{Automation, AutomationType};
use crate::dsp::util::pan_scale;
use crate::effect::{EffectChain, EffectContext, EffectKind, EffectUnit};
use crate::endpoint::{Endpoint, RouteTable, Session, ThreadId, WriteFlags};
use crate::types::{Channel, StereoBuffer};

use super::error::{EngineError, EngineResult};

/// Upper bound of the volume endpoint
pub const TRACK_MAX_VOL: f32 = 3.0;

/// Clip references a track reserves room for
pub const MAX_CLIPS_PER_TRACK: usize = 256;

/// Recorded or imported audio, shared between clip references
#[derive(Debug)]
pub struct ClipAudio {
    name: String,
    buffer: StereoBuffer,
}

impl ClipAudio {
    pub fn new(name: impl Into<String>, buffer: StereoBuffer) -> Self {
        Self {
            name: name.into(),
            buffer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn buffer(&self) -> &StereoBuffer {
        &self.buffer
    }
}

/// Placement of a clip on a track
#[derive(Clone)]
pub struct ClipRef {
    /// Timeline position of the first played frame
    pub pos: i32,
    /// First frame of the clip that is played
    pub in_mark: i32,
    /// Number of frames played from `in_mark`
    pub len: i32,
    pub audio: Shared<ClipAudio>,
    pub gain: f32,
}

impl ClipRef {
    /// Whole clip at `pos`, unity gain
    pub fn new(audio: Shared<ClipAudio>, pos: i32) -> Self {
        let len = audio.len().min(i32::MAX as usize) as i32;
        Self {
            pos,
            in_mark: 0,
            len,
            audio,
            gain: 1.0,
        }
    }

    /// Play only frames `in_mark..out_mark`, clamped to the clip
    pub fn with_marks(mut self, in_mark: i32, out_mark: i32) -> Self {
        let clip_len = self.audio.len().min(i32::MAX as usize) as i32;
        let in_mark = in_mark.clamp(0, clip_len);
        let out_mark = out_mark.clamp(in_mark, clip_len);
        self.in_mark = in_mark;
        self.len = out_mark - in_mark;
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    /// Timeline position one past the last played frame
    pub fn end(&self) -> i32 {
        self.pos.saturating_add(self.len)
    }
}

pub struct Track {
    name: String,
    vol: Endpoint,
    pan: Endpoint,
    muted: bool,
    clips: Vec<ClipRef>,
    automations: Vec<Arc<Automation>>,
    chain: EffectChain,
    max_chunk: usize,
    buffer: StereoBuffer,
    vol_curve: Vec<f32>,
    pan_curve: Vec<f32>,
}

impl Track {
    /// Empty track able to render chunks of up to `ctx.chunk_len` frames
    pub fn new(name: impl Into<String>, ctx: EffectContext) -> Self {
        Self::with_blocked(name, ctx, [])
    }

    /// Track whose chain refuses the `blocked` effect kinds
    pub fn with_blocked(
        name: impl Into<String>,
        ctx: EffectContext,
        blocked: impl IntoIterator<Item = EffectKind>,
    ) -> Self {
        let max_chunk = ctx.chunk_len;
        Self {
            name: name.into(),
            vol: Endpoint::builder("vol", "Volume", 1.0f32, ThreadId::Dsp)
                .with_range(0.0f32, TRACK_MAX_VOL)
                .build(),
            pan: Endpoint::builder("pan", "Pan", 0.5f32, ThreadId::Dsp)
                .with_range(0.0f32, 1.0f32)
                .build(),
            muted: false,
            clips: Vec::with_capacity(MAX_CLIPS_PER_TRACK),
            automations: Vec::with_capacity(AutomationType::ALL.len()),
            chain: EffectChain::with_blocked(ctx, blocked),
            max_chunk,
            buffer: StereoBuffer::silence(max_chunk),
            vol_curve: vec![0.0; max_chunk],
            pan_curve: vec![0.0; max_chunk],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Longest chunk this track can render
    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    pub fn vol(&self) -> &Endpoint {
        &self.vol
    }

    pub fn pan(&self) -> &Endpoint {
        &self.pan
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut EffectChain {
        &mut self.chain
    }

    pub fn clips(&self) -> &[ClipRef] {
        &self.clips
    }

    /// Add a clip reference; returns its index
    pub fn add_clip(&mut self, clip: ClipRef) -> EngineResult<usize> {
        if self.clips.len() >= MAX_CLIPS_PER_TRACK {
            log::warn!("Track {} already holds {} clips", self.name, MAX_CLIPS_PER_TRACK);
            return Err(EngineError::TooManyClips(MAX_CLIPS_PER_TRACK));
        }
        self.clips.push(clip);
        Ok(self.clips.len() - 1)
    }

    pub fn remove_clip(&mut self, index: usize) -> Option<ClipRef> {
        (index < self.clips.len()).then(|| self.clips.remove(index))
    }

    pub fn automations(&self) -> &[Arc<Automation>] {
        &self.automations
    }

    pub fn automation(&self, kind: AutomationType) -> Option<&Arc<Automation>> {
        find_automation(&self.automations, kind)
    }

    /// Automation of `kind`, created and bound to its endpoint on first use
    ///
    /// FIR and delay automations bind to the first effect of that kind in the
    /// chain, so add the effect first. Play speed belongs to the timeline and
    /// is refused here.
    pub fn add_automation(&mut self, kind: AutomationType) -> Option<Arc<Automation>> {
        if let Some(existing) = self.automation(kind) {
            return Some(existing.clone());
        }
        let target = automation_target(&self.chain, &self.vol, &self.pan, kind)?;
        let automation = Arc::new(Automation::new(kind));
        if !target.bind_automation(automation.clone()) {
            log::warn!("{} already has an automation bound", target.local_id());
        }
        self.automations.push(automation.clone());
        Some(automation)
    }

    /// Last rendered chunk
    pub fn output(&self) -> &StereoBuffer {
        &self.buffer
    }

    /// Render the dry signal for `len` frames starting at `start_pos`
    ///
    /// `step` is the play speed: each output frame advances the read position
    /// by `step` frames (negative plays backwards). Returns the summed
    /// absolute amplitude of the result.
    pub fn channel_chunk(&mut self, session: &Session, start_pos: i32, len: usize, step: f32) -> EngineResult<f32> {
        if len == 0 || len > self.max_chunk {
            return Err(EngineError::InvalidChunkLength {
                len,
                max: self.max_chunk,
            });
        }
        self.buffer.resize(len);
        self.buffer.fill_silence();
        if self.muted {
            return Ok(0.0);
        }

        self.apply_automation(session, start_pos);

        let vol_curve = &mut self.vol_curve[..len];
        let pan_curve = &mut self.pan_curve[..len];
        fill_curve(&self.automations, AutomationType::Vol, &self.vol, start_pos, step, vol_curve);
        fill_curve(&self.automations, AutomationType::Pan, &self.pan, start_pos, step, pan_curve);

        let out = self.buffer.as_mut_slice();
        for clip in &self.clips {
            let mut pos_in_clip = start_pos as f64 - clip.pos as f64;
            let end = pos_in_clip + step as f64 * len as f64;
            let (lo, hi) = if end >= pos_in_clip {
                (pos_in_clip, end)
            } else {
                (end, pos_in_clip)
            };
            if hi < 0.0 || lo > clip.len as f64 {
                continue;
            }
            let src = clip.audio.buffer().as_slice();
            for (i, frame) in out.iter_mut().enumerate() {
                if pos_in_clip >= 0.0 && pos_in_clip < clip.len as f64 {
                    let idx = pos_in_clip as usize + clip.in_mark as usize;
                    if let Some(s) = src.get(idx) {
                        let vol = vol_curve[i] * clip.gain;
                        let pan = pan_curve[i];
                        frame.left += s.left * vol * pan_scale(pan, Channel::Left);
                        frame.right += s.right * vol * pan_scale(pan, Channel::Right);
                    }
                }
                pos_in_clip += step as f64;
            }
        }
        Ok(self.buffer.amplitude())
    }

    /// Render the chunk and run it through the effect chain
    pub fn render(&mut self, session: &Session, start_pos: i32, len: usize, step: f32) -> EngineResult<f32> {
        let input_amp = self.channel_chunk(session, start_pos, len, step)?;
        Ok(self.chain.buf_apply(&mut self.buffer, input_amp))
    }

    /// Push each read-mode automation's value at `pos` through its endpoint
    fn apply_automation(&self, session: &Session, pos: i32) {
        for automation in &self.automations {
            if !automation.is_read() {
                continue;
            }
            let kind = automation.kind();
            let Some(value) = automation.try_get_value(pos) else {
                continue;
            };
            if kind == AutomationType::DelTime && value.as_i32() < 0 {
                log::warn!("Delay time automation read negative value {}", value);
                continue;
            }
            let Some(target) = automation_target(&self.chain, &self.vol, &self.pan, kind) else {
                continue;
            };
            let flags = WriteFlags {
                gui: true,
                ..WriteFlags::NONE
            };
            if let Err(e) = target.write(session, ThreadId::Dsp, value.cast(target.val_type()), flags) {
                log::warn!("Automation write to {} failed: {}", target.local_id(), e);
            }
        }
    }

    /// Register volume, pan and every effect endpoint under `parent` + name
    pub fn register_routes<S: AsRef<str>>(&self, table: &mut RouteTable, parent: &[S]) -> usize {
        let mut components: Vec<&str> = parent.iter().map(|s| s.as_ref()).collect();
        components.push(&self.name);
        table.register(&components, &self.vol);
        table.register(&components, &self.pan);
        2 + self.chain.register_routes(table, &components)
    }
}

fn find_automation(automations: &[Arc<Automation>], kind: AutomationType) -> Option<&Arc<Automation>> {
    automations.iter().find(|a| a.kind() == kind)
}

/// Endpoint an automation of `kind` drives on this track
fn automation_target(chain: &EffectChain, vol: &Endpoint, pan: &Endpoint, kind: AutomationType) -> Option<Endpoint> {
    let ep = match kind {
        AutomationType::Vol => vol,
        AutomationType::Pan => pan,
        AutomationType::FirCutoff | AutomationType::FirBandwidth => {
            let fir = chain.effects().find_map(|fx| match fx.unit() {
                EffectUnit::Fir(f) => Some(f),
                _ => None,
            })?;
            if kind == AutomationType::FirCutoff {
                fir.cutoff()
            } else {
                fir.bandwidth()
            }
        }
        AutomationType::DelTime | AutomationType::DelAmp => {
            let delay = chain.effects().find_map(|fx| match fx.unit() {
                EffectUnit::Delay(d) => Some(d),
                _ => None,
            })?;
            if kind == AutomationType::DelTime {
                delay.len_msec()
            } else {
                delay.amp()
            }
        }
        AutomationType::PlaySpeed => return None,
    };
    Some(ep.clone())
}

/// Per-sample values of a volume or pan curve, or the endpoint's value when
/// no automation is being read
fn fill_curve(
    automations: &[Arc<Automation>],
    kind: AutomationType,
    ep: &Endpoint,
    start_pos: i32,
    step: f32,
    out: &mut [f32],
) {
    let filled = find_automation(automations, kind)
        .filter(|a| a.is_read())
        .is_some_and(|a| a.try_fill(start_pos, step, out));
    if !filled {
        out.fill(ep.read(ThreadId::Dsp).as_f32());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Value;
    use crate::engine::gc::gc_handle;
    use approx::assert_relative_eq;

    fn ctx() -> EffectContext {
        EffectContext {
            sample_rate: 1000,
            chunk_len: 16,
            delay_max_secs: 1.0,
        }
    }

    fn ramp_clip(len: usize) -> Shared<ClipAudio> {
        let left: Vec<f32> = (0..len).map(|i| i as f32 / 100.0).collect();
        let right = left.clone();
        Shared::new(&gc_handle(), ClipAudio::new("ramp", StereoBuffer::from_channels(&left, &right)))
    }

    #[test]
    fn test_clip_is_placed_on_timeline() {
        let session = Session::new();
        let mut track = Track::new("Track 1", ctx());
        track.add_clip(ClipRef::new(ramp_clip(8), 4)).unwrap();
        let amp = track.channel_chunk(&session, 0, 16, 1.0).unwrap();
        let out = track.output();
        assert_eq!(out[3].left, 0.0);
        assert_eq!(out[4].left, 0.0);
        assert_relative_eq!(out[5].left, 0.01);
        assert_relative_eq!(out[11].right, 0.07);
        assert_eq!(out[12].left, 0.0);
        assert!(amp > 0.0);
    }

    #[test]
    fn test_marks_and_gain() {
        let session = Session::new();
        let mut track = Track::new("t", ctx());
        let clip = ClipRef::new(ramp_clip(10), 0).with_marks(2, 5).with_gain(2.0);
        assert_eq!(clip.len, 3);
        assert_eq!(clip.end(), 3);
        track.add_clip(clip).unwrap();
        track.channel_chunk(&session, 0, 4, 1.0).unwrap();
        let out = track.output();
        assert_relative_eq!(out[0].left, 0.04);
        assert_relative_eq!(out[2].left, 0.08);
        assert_eq!(out[3].left, 0.0);
    }

    #[test]
    fn test_pan_law() {
        let session = Session::new();
        let mut track = Track::new("t", ctx());
        let ones = StereoBuffer::from_channels(&[1.0; 16], &[1.0; 16]);
        track
            .add_clip(ClipRef::new(Shared::new(&gc_handle(), ClipAudio::new("dc", ones)), 0))
            .unwrap();
        track
            .pan()
            .write(&session, ThreadId::Main, Value::Float(0.75), WriteFlags::NONE)
            .unwrap();
        track.channel_chunk(&session, 0, 4, 1.0).unwrap();
        assert_relative_eq!(track.output()[0].left, 0.5);
        assert_relative_eq!(track.output()[0].right, 1.0);
    }

    #[test]
    fn test_mute_renders_silence() {
        let session = Session::new();
        let mut track = Track::new("t", ctx());
        track.add_clip(ClipRef::new(ramp_clip(16), 0)).unwrap();
        track.set_muted(true);
        assert_eq!(track.channel_chunk(&session, 0, 16, 1.0).unwrap(), 0.0);
        assert_eq!(track.output().peak(), 0.0);
    }

    #[test]
    fn test_reverse_step() {
        let session = Session::new();
        let mut track = Track::new("t", ctx());
        track.add_clip(ClipRef::new(ramp_clip(16), 0)).unwrap();
        track.channel_chunk(&session, 10, 4, -2.0).unwrap();
        let out = track.output();
        assert_relative_eq!(out[0].left, 0.10);
        assert_relative_eq!(out[1].left, 0.08);
        assert_relative_eq!(out[3].left, 0.04);
    }

    #[test]
    fn test_chunk_length_is_checked() {
        let session = Session::new();
        let mut track = Track::new("t", ctx());
        assert_eq!(
            track.channel_chunk(&session, 0, 17, 1.0),
            Err(EngineError::InvalidChunkLength { len: 17, max: 16 })
        );
        assert!(track.channel_chunk(&session, 0, 0, 1.0).is_err());
    }

    #[test]
    fn test_volume_automation_per_sample() {
        let session = Session::new();
        let mut track = Track::new("t", ctx());
        let ones = StereoBuffer::from_channels(&[1.0; 16], &[1.0; 16]);
        track
            .add_clip(ClipRef::new(Shared::new(&gc_handle(), ClipAudio::new("dc", ones)), 0))
            .unwrap();
        let vol = track.add_automation(AutomationType::Vol).unwrap();
        vol.insert(0, Value::Float(0.0));
        vol.insert(8, Value::Float(2.0));
        vol.set_read(true);

        track.channel_chunk(&session, 0, 16, 1.0).unwrap();
        let out = track.output();
        assert_relative_eq!(out[0].left, 0.0);
        assert_relative_eq!(out[4].left, 1.0);
        assert_relative_eq!(out[12].left, 2.0);
        // Chunk-start value is pushed through the endpoint
        assert_eq!(track.vol().read(ThreadId::Dsp), Value::Float(0.0));
    }

    #[test]
    fn test_effect_automation_drives_endpoint() {
        let session = Session::new();
        let mut track = Track::new("t", ctx());
        assert!(track.add_automation(AutomationType::DelAmp).is_none());
        track.chain_mut().add(EffectKind::Delay).unwrap();
        let amp = track.add_automation(AutomationType::DelAmp).unwrap();
        amp.insert(0, Value::Double(0.25));
        amp.set_read(true);
        track.render(&session, 100, 8, 1.0).unwrap();
        let EffectUnit::Delay(delay) = track.chain().get(0).unwrap().unit() else {
            panic!("expected delay");
        };
        assert_eq!(delay.amp().read(ThreadId::Dsp), Value::Double(0.25));
        assert_eq!(delay.line().amp(), 0.25);
        assert!(track.add_automation(AutomationType::PlaySpeed).is_none());
    }

    #[test]
    fn test_register_routes() {
        let mut track = Track::new("Track 1", ctx());
        track.chain_mut().add(EffectKind::Fir).unwrap();
        let mut table = RouteTable::new();
        let count = track.register_routes(&mut table, &["timeline"]);
        assert_eq!(count, table.len());
        assert!(table.get("/timeline/track_1/vol").is_some());
        assert!(table.get("/timeline/track_1/fir_filter/cutoff").is_some());
    }
}
