//! Per-chunk timeline mixdown
//!
//! [`Mixdown::process_chunk`] is the whole DSP-thread cycle:
//! 1. apply queued endpoint writes and callbacks for `ThreadId::Dsp`
//! 2. drain structural [`EngineCommand`]s
//! 3. sample the play speed automation
//! 4. render every track (clips, automation, effect chain); a track that
//!    fails to render is logged and left out of the sum
//! 5. sum into the master bus and hard clip once
//! 6. advance the playhead by `len · step` while playing
//!
//! Nothing in the cycle blocks: queues are `try_lock`ed and commands come
//! over a wait-free ring buffer.

use std::sync::Arc;

use basedrop::Owned;

use super::command::EngineCommand;
use super::error::{EngineError, EngineResult};
use super::track::Track;
use crate::automation::{Automation, AutomationType, MAX_PLAY_SPEED};
use crate::effect::EffectContext;
use crate::endpoint::{Endpoint, RouteTable, Session, ThreadId, WriteFlags};
use crate::types::StereoBuffer;

/// Tracks a timeline reserves room for
pub const MAX_TRACKS: usize = 255;

/// Route component the timeline registers under
pub const TIMELINE_ROUTE: &str = "timeline";

pub struct Mixdown {
    session: Arc<Session>,
    ctx: EffectContext,
    tracks: Vec<Owned<Track>>,
    commands: rtrb::Consumer<EngineCommand>,
    play_speed: Endpoint,
    speed_automation: Arc<Automation>,
    master: StereoBuffer,
}

impl Mixdown {
    pub fn new(ctx: EffectContext, session: Arc<Session>, commands: rtrb::Consumer<EngineCommand>) -> Self {
        let play_speed = Endpoint::builder("play_speed", "Play speed", 1.0f32, ThreadId::Dsp)
            .with_range(-MAX_PLAY_SPEED, MAX_PLAY_SPEED)
            .build();
        let speed_automation = Arc::new(Automation::new(AutomationType::PlaySpeed));
        play_speed.bind_automation(speed_automation.clone());
        Self {
            session,
            ctx,
            tracks: Vec::with_capacity(MAX_TRACKS),
            commands,
            play_speed,
            speed_automation,
            master: StereoBuffer::silence(ctx.chunk_len),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn context(&self) -> &EffectContext {
        &self.ctx
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().map(|t| &**t)
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index).map(|t| &**t)
    }

    pub fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index).map(|t| &mut **t)
    }

    /// Timeline play speed; negative plays backwards
    pub fn play_speed(&self) -> &Endpoint {
        &self.play_speed
    }

    pub fn play_speed_automation(&self) -> &Arc<Automation> {
        &self.speed_automation
    }

    /// Master bus after the last chunk
    pub fn master(&self) -> &StereoBuffer {
        &self.master
    }

    /// Append a track directly, before the mixdown moves to the DSP thread
    ///
    /// A track that cannot render a full chunk of this mixdown is refused.
    pub fn add_track(&mut self, track: Owned<Track>) -> EngineResult<usize> {
        if self.tracks.len() >= MAX_TRACKS {
            return Err(EngineError::TooManyTracks(MAX_TRACKS));
        }
        if track.max_chunk() < self.ctx.chunk_len {
            return Err(EngineError::InvalidChunkLength {
                len: self.ctx.chunk_len,
                max: track.max_chunk(),
            });
        }
        self.tracks.push(track);
        Ok(self.tracks.len() - 1)
    }

    /// Register the play speed and every track under `/timeline`
    pub fn register_routes(&self, table: &mut RouteTable) -> usize {
        table.register(&[TIMELINE_ROUTE], &self.play_speed);
        1 + self
            .tracks
            .iter()
            .map(|t| t.register_routes(table, &[TIMELINE_ROUTE]))
            .sum::<usize>()
    }

    /// Mix `len` frames into the master bus
    pub fn process_chunk(&mut self, len: usize) -> EngineResult<&StereoBuffer> {
        if len == 0 || len > self.ctx.chunk_len {
            return Err(EngineError::InvalidChunkLength {
                len,
                max: self.ctx.chunk_len,
            });
        }

        if self.session.flush_val_changes(ThreadId::Dsp).is_none() {
            log::debug!("DSP value queue busy; deferring to next chunk");
        }
        self.session.flush_callbacks(ThreadId::Dsp);
        self.drain_commands();

        let start = self.session.playhead();
        if self.speed_automation.is_read() {
            if let Some(speed) = self.speed_automation.try_get_value(start) {
                let flags = WriteFlags {
                    gui: true,
                    ..WriteFlags::NONE
                };
                if let Err(e) = self.play_speed.write(&self.session, ThreadId::Dsp, speed, flags) {
                    log::warn!("Play speed automation write failed: {}", e);
                }
            }
        }
        let step = self.play_speed.read(ThreadId::Dsp).as_f32();

        self.master.resize(len);
        self.master.fill_silence();
        for track in &mut self.tracks {
            match track.render(&self.session, start, len, step) {
                Ok(_) => self.master.add_buffer(track.output()),
                Err(e) => log::error!("Track {} skipped: {}", track.name(), e),
            }
        }
        self.master.clip();

        if self.session.is_playing() {
            let advance = (len as f64 * step as f64).round() as i64;
            self.session.set_playhead(start as i64 + advance);
        }
        Ok(&self.master)
    }

    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            if let Err(e) = self.handle_command(cmd) {
                log::warn!("Engine command failed: {}", e);
            }
        }
    }

    fn track_index(&self, track: usize) -> EngineResult<usize> {
        if track >= self.tracks.len() {
            return Err(EngineError::TrackOutOfBounds {
                index: track,
                len: self.tracks.len(),
            });
        }
        Ok(track)
    }

    fn handle_command(&mut self, cmd: EngineCommand) -> EngineResult<()> {
        match cmd {
            EngineCommand::AddTrack(track) => {
                self.add_track(track)?;
            }
            EngineCommand::RemoveTrack { track } => {
                let i = self.track_index(track)?;
                drop(self.tracks.remove(i));
            }
            EngineCommand::SetMute { track, muted } => {
                let i = self.track_index(track)?;
                self.tracks[i].set_muted(muted);
            }
            EngineCommand::AddClip { track, clip } => {
                let i = self.track_index(track)?;
                self.tracks[i].add_clip(clip)?;
            }
            EngineCommand::RemoveClip { track, index } => {
                let i = self.track_index(track)?;
                self.tracks[i].remove_clip(index);
            }
            EngineCommand::AddEffect { track, effect } => {
                let i = self.track_index(track)?;
                self.tracks[i].chain_mut().push(effect)?;
            }
            EngineCommand::RemoveEffect { track, index } => {
                let i = self.track_index(track)?;
                self.tracks[i].chain_mut().remove(index)?;
            }
            EngineCommand::SwapEffects { track, a, b } => {
                let i = self.track_index(track)?;
                self.tracks[i].chain_mut().swap(a, b)?;
            }
            EngineCommand::SilenceEffects => {
                for track in &mut self.tracks {
                    track.chain_mut().silence();
                }
            }
            EngineCommand::SetPlaying(playing) => self.session.set_playing(playing),
            EngineCommand::Seek { position } => self.session.set_playhead(position),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{ChainEffect, EffectKind};
    use crate::endpoint::Value;
    use crate::engine::command::command_channel;
    use crate::engine::gc::gc_handle;
    use crate::engine::track::{ClipAudio, ClipRef};
    use approx::assert_relative_eq;
    use basedrop::Shared;

    fn ctx() -> EffectContext {
        EffectContext {
            sample_rate: 1000,
            chunk_len: 32,
            delay_max_secs: 1.0,
        }
    }

    fn dc_track(name: &str, level: f32) -> Owned<Track> {
        let mut track = Track::new(name, ctx());
        let buf = StereoBuffer::from_channels(&[level; 256], &[level; 256]);
        let audio = Shared::new(&gc_handle(), ClipAudio::new("dc", buf));
        track.add_clip(ClipRef::new(audio, 0)).unwrap();
        Owned::new(&gc_handle(), track)
    }

    #[test]
    fn test_sum_and_single_clip() {
        let session = Arc::new(Session::new());
        let (mut tx, rx) = command_channel();
        let mut mix = Mixdown::new(ctx(), session.clone(), rx);
        tx.push(EngineCommand::AddTrack(dc_track("a", 0.3))).ok().unwrap();
        tx.push(EngineCommand::AddTrack(dc_track("b", 0.3))).ok().unwrap();
        tx.push(EngineCommand::AddTrack(dc_track("c", 0.6))).ok().unwrap();

        let master = mix.process_chunk(16).unwrap();
        assert_eq!(master.len(), 16);
        // 0.3 + 0.3 + 0.6 clipped once at the end
        assert_eq!(master[0].left, 1.0);
        assert_eq!(mix.tracks().count(), 3);
        // Individual tracks are not clipped
        assert_relative_eq!(mix.track(2).unwrap().output()[0].left, 0.6);
    }

    #[test]
    fn test_short_track_is_refused() {
        let session = Arc::new(Session::new());
        let (mut tx, rx) = command_channel();
        let mut mix = Mixdown::new(ctx(), session.clone(), rx);
        let small_ctx = EffectContext {
            chunk_len: 16,
            ..ctx()
        };
        let small = Owned::new(&gc_handle(), Track::new("small", small_ctx));
        assert_eq!(
            mix.add_track(Owned::new(&gc_handle(), Track::new("small", small_ctx))),
            Err(EngineError::InvalidChunkLength { len: 32, max: 16 })
        );

        tx.push(EngineCommand::AddTrack(dc_track("a", 0.3))).ok().unwrap();
        tx.push(EngineCommand::AddTrack(small)).ok().unwrap();
        tx.push(EngineCommand::SetPlaying(true)).ok().unwrap();
        for i in 1..=3 {
            let master = mix.process_chunk(32).unwrap();
            assert_relative_eq!(master[0].left, 0.3);
            assert_eq!(session.playhead(), 32 * i);
        }
        assert_eq!(mix.tracks().count(), 1);
    }

    #[test]
    fn test_playhead_advances_by_speed() {
        let session = Arc::new(Session::new());
        let (mut tx, rx) = command_channel();
        let mut mix = Mixdown::new(ctx(), session.clone(), rx);

        mix.process_chunk(32).unwrap();
        assert_eq!(session.playhead(), 0);

        tx.push(EngineCommand::SetPlaying(true)).ok().unwrap();
        mix.process_chunk(32).unwrap();
        assert_eq!(session.playhead(), 32);

        mix.play_speed()
            .write(&session, ThreadId::Dsp, Value::Float(-0.5), WriteFlags::NONE)
            .unwrap();
        mix.process_chunk(32).unwrap();
        assert_eq!(session.playhead(), 16);

        tx.push(EngineCommand::Seek { position: 1000 }).ok().unwrap();
        mix.process_chunk(8).unwrap();
        assert_eq!(session.playhead(), 996);
    }

    #[test]
    fn test_queued_write_lands_next_chunk() {
        let session = Arc::new(Session::new());
        session.set_playing(true);
        let (_tx, rx) = command_channel();
        let mut mix = Mixdown::new(ctx(), session.clone(), rx);
        mix.add_track(dc_track("a", 0.5)).unwrap();
        let vol = mix.track(0).unwrap().vol().clone();

        vol.write(&session, ThreadId::Main, Value::Float(0.5), WriteFlags::NONE)
            .unwrap();
        assert_eq!(vol.read(ThreadId::Dsp), Value::Float(1.0));
        let master = mix.process_chunk(8).unwrap();
        assert_relative_eq!(master[0].left, 0.25);
    }

    #[test]
    fn test_structural_commands() {
        let session = Arc::new(Session::new());
        let (mut tx, rx) = command_channel();
        let mut mix = Mixdown::new(ctx(), session.clone(), rx);
        mix.add_track(dc_track("a", 0.5)).unwrap();

        let effect = ChainEffect::new(EffectKind::Saturation, "Saturation", &ctx()).unwrap();
        tx.push(EngineCommand::AddEffect {
            track: 0,
            effect: Owned::new(&gc_handle(), effect),
        })
        .ok()
        .unwrap();
        tx.push(EngineCommand::SetMute { track: 3, muted: true }).ok().unwrap();
        mix.process_chunk(8).unwrap();
        assert_eq!(mix.track(0).unwrap().chain().len(), 1);

        tx.push(EngineCommand::SetMute { track: 0, muted: true }).ok().unwrap();
        let master = mix.process_chunk(8).unwrap();
        assert_eq!(master.peak(), 0.0);

        tx.push(EngineCommand::RemoveTrack { track: 0 }).ok().unwrap();
        mix.process_chunk(8).unwrap();
        assert_eq!(mix.tracks().count(), 0);
    }

    #[test]
    fn test_chunk_length_is_checked() {
        let (_tx, rx) = command_channel();
        let mut mix = Mixdown::new(ctx(), Arc::new(Session::new()), rx);
        assert!(matches!(
            mix.process_chunk(64),
            Err(EngineError::InvalidChunkLength { len: 64, max: 32 })
        ));
    }

    #[test]
    fn test_register_routes() {
        let (_tx, rx) = command_channel();
        let mut mix = Mixdown::new(ctx(), Arc::new(Session::new()), rx);
        mix.add_track(dc_track("Track 1", 0.1)).unwrap();
        let mut table = RouteTable::new();
        assert_eq!(mix.register_routes(&mut table), 3);
        assert!(table.get("/timeline/play_speed").is_some());
        assert!(table.get("/timeline/track_1/pan").is_some());
    }
}
