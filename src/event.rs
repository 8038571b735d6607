//! The event router: turns MIDI-like note/control events into per-voice
//! change lists, and — since it is itself a [`crate::proc::Proc`] — renders
//! those change lists into dense, linearly-interpolated per-vector signals
//! (pitch/gate/velocity/pressure per voice) that feed a
//! [`crate::voice::VoiceMultiplier`]'s template graph.

use std::any::Any;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::GraphResult;
use crate::id::ProcId;
use crate::proc::{BufferHandle, PrepareContext, Proc, ProcIo};
use crate::scale::Scale;

/// How incoming note events are spread across a multiplier's copies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceAllocationMode {
    /// Every copy plays every note together — a thickened, one-voice-deep
    /// unison rather than true polyphony.
    Unison,
    /// Classic round-robin polyphony: each note claims one free copy, and
    /// when none are free, one is stolen according to `steal_fallback`.
    Polyphonic { steal_fallback: StealFallback },
    /// One copy per MIDI channel (MPE): channel 1 is the shared "main"
    /// channel, channels 2..=16 are per-note member channels.
    Mpe,
}

/// Which voice to steal when a `Polyphonic` router has no free copy left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StealFallback {
    /// Steal whichever active voice's note is closest in pitch to the
    /// incoming one.
    NearestNote,
    /// Steal the least-recently-triggered voice, preferring one that isn't
    /// currently held by the sustain pedal.
    Oldest,
}

#[derive(Debug, Clone, Copy)]
struct VoiceState {
    active: bool,
    sustained: bool,
    /// The id of the `NoteOn` that triggered this voice, so a later
    /// `NoteOff`/`NotePressure` on the same note number but from a
    /// different instigating source doesn't touch it.
    id: u64,
    note: u8,
    velocity: f32,
    channel: u8,
    age: u64,
    /// Drift folded in at note-on (Unison mode only), in octaves.
    drift_octaves: f32,
    /// Per-note pitch bend, in semitones (from `pitchWheel` on this voice's
    /// own channel, MPE member channels only).
    bend_semitones: f32,
    /// Main-channel pitch bend broadcast to every voice (MPE channel 1, or
    /// the single channel in non-MPE modes).
    main_bend_semitones: f32,
    pressure: f32,
    main_pressure: f32,
}

impl VoiceState {
    fn idle() -> Self {
        VoiceState {
            active: false,
            sustained: false,
            id: 0,
            note: 0,
            velocity: 0.0,
            channel: 0,
            age: 0,
            drift_octaves: 0.0,
            bend_semitones: 0.0,
            main_bend_semitones: 0.0,
            pressure: 0.0,
            main_pressure: 0.0,
        }
    }
}

/// One incoming control event, timestamped by the caller relative to the
/// start of whatever vector it will be routed into.
///
/// `NoteOn`/`NoteOff`/`NotePressure` each carry an `id`: the instigating
/// source's identifier, chosen by the caller (e.g. a host's note id, or a
/// monotonic counter for callers with no native concept of one). Matching
/// note-off and per-note pressure against `id` rather than against the raw
/// note number means two different sources sounding the same note can be
/// released independently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEvent {
    NoteOn { id: u64, note: u8, velocity: f32, channel: u8 },
    NoteOff { id: u64, note: u8, channel: u8 },
    Sustain(bool),
    Controller { number: u8, value: f32, channel: u8 },
    /// Normalized wheel position in `[-1.0, 1.0]`.
    PitchWheel { value: f32, channel: u8 },
    NotePressure { id: u64, note: u8, pressure: f32, channel: u8 },
    ChannelPressure { pressure: f32, channel: u8 },
}

// spmcq's ring buffer needs a placeholder value for unread slots.
impl Default for NoteEvent {
    fn default() -> Self {
        NoteEvent::Sustain(false)
    }
}

/// One instruction to apply to a voice multiplier's copy: gate it on or off
/// with the given note/velocity/pitch. Produced by [`EventRouter::handle`]
/// for callers that want the discrete event rather than the rendered dense
/// signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceChange {
    pub voice_index: usize,
    pub gate_on: bool,
    pub note: u8,
    pub velocity: f32,
    pub drift_cents: f32,
    /// The note's log-pitch (octaves, 0.0 at the scale's reference note),
    /// as derived by the external [`Scale`] collaborator, with any drift
    /// already folded in. `0.0` on gate-off changes, where pitch is moot.
    pub log_pitch: f32,
}

/// Generates small, stable per-voice pitch offsets so a unison stack of
/// identical copies doesn't sound phase-locked and lifeless.
pub struct DriftGenerator {
    rng: SmallRng,
}

impl DriftGenerator {
    pub fn new(seed: u64) -> Self {
        DriftGenerator {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn next_cents(&mut self, spread_cents: f32) -> f32 {
        if spread_cents <= 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-spread_cents..=spread_cents)
    }
}

/// One voice's instantaneous pitch/gate/velocity/pressure — a single point
/// on that voice's dense change-list-to-signal ramp.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct VoiceSignal {
    pitch: f32,
    gate: f32,
    velocity: f32,
    pressure: f32,
}

/// Routes note events to voice copies, tracks enough per-voice state
/// (active/sustained/note/age/bend/pressure) to steal sensibly when every
/// copy is busy, and — as a `Proc` — renders that state into the dense
/// per-voice signals a voice multiplier's template graph consumes.
///
/// Outputs are four per voice, in voice order: `pitch{i}`, `gate{i}`,
/// `velocity{i}`, `pressure{i}`.
pub struct EventRouter {
    id: ProcId,
    name: String,
    io: ProcIo,
    mode: VoiceAllocationMode,
    voices: Vec<VoiceState>,
    round_robin_idx: usize,
    age_counter: u64,
    sustain_held: bool,
    drift: DriftGenerator,
    unison_drift_cents: f32,
    wheel_range_semitones: f32,
    scale: Box<dyn Scale>,
    vector_size: usize,
    /// Events queued by `push_events` for the vector about to be rendered by
    /// `process`, as `(sample_offset, event)` pairs.
    pending: Vec<(usize, NoteEvent)>,
    /// Per-voice change points accumulated while draining `pending`; reused
    /// every vector rather than reallocated.
    change_scratch: Vec<Vec<(usize, VoiceSignal)>>,
    /// Per-channel sample scratch, reused every vector: `[pitch, gate,
    /// velocity, pressure]`.
    channel_scratch: [Vec<f32>; 4],
    /// Each voice's signal value as of the end of the previous vector — the
    /// ramp's starting point for the next one.
    last_values: Vec<VoiceSignal>,
}

impl EventRouter {
    /// `scale` derives each note's log-pitch; pass `Box::new(EqualTemperament::default())`
    /// for ordinary 12-tone equal temperament, or a custom [`Scale`] for
    /// anything else.
    pub fn new(voice_count: usize, mode: VoiceAllocationMode, scale: Box<dyn Scale>) -> Self {
        let mut io = ProcIo::fixed(&[], &[]);
        for i in 0..voice_count {
            io.add_named_output(format!("pitch{i}"));
            io.add_named_output(format!("gate{i}"));
            io.add_named_output(format!("velocity{i}"));
            io.add_named_output(format!("pressure{i}"));
        }
        EventRouter {
            id: ProcId::new_unique(),
            name: "event_router".to_string(),
            io,
            mode,
            voices: vec![VoiceState::idle(); voice_count],
            round_robin_idx: 0,
            age_counter: 0,
            sustain_held: false,
            drift: DriftGenerator::new(crate::globals::process_seed()),
            unison_drift_cents: 0.0,
            wheel_range_semitones: 2.0,
            scale,
            vector_size: 0,
            pending: Vec::new(),
            change_scratch: vec![Vec::new(); voice_count],
            channel_scratch: [Vec::new(), Vec::new(), Vec::new(), Vec::new()],
            last_values: vec![VoiceSignal::default(); voice_count],
        }
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Sets the unison spread (in cents) applied to each copy's drift when
    /// `mode` is `Unison`. Zero disables drift entirely.
    pub fn set_unison_drift_cents(&mut self, cents: f32) {
        self.unison_drift_cents = cents.max(0.0);
    }

    /// Sets the pitch wheel's travel, in semitones at full deflection.
    pub fn set_pitch_wheel_range_semitones(&mut self, semitones: f32) {
        self.wheel_range_semitones = semitones.max(0.0);
    }

    /// Queues events for the vector `process` is about to render, as
    /// `(sample_offset, event)` pairs relative to that vector's start.
    /// Offsets are clamped to the vector on render, not here.
    pub fn push_events(&mut self, events: &[(usize, NoteEvent)]) {
        self.pending.extend_from_slice(events);
    }

    /// Routes one event immediately and returns the resulting discrete
    /// voice changes, without touching the dense signal outputs. Lighter
    /// weight than the `Proc` path for callers driving a voice multiplier
    /// directly (`set_copy_enabled`/`set_param`) instead of wiring this
    /// router into the graph.
    pub fn handle(&mut self, event: NoteEvent) -> Vec<VoiceChange> {
        match event {
            NoteEvent::NoteOn {
                id,
                note,
                velocity,
                channel,
            } => self.note_on(id, note, velocity, channel),
            NoteEvent::NoteOff { id, .. } => self.note_off(id),
            NoteEvent::Sustain(held) => self.sustain(held),
            NoteEvent::Controller { .. } => Vec::new(),
            NoteEvent::PitchWheel { value, channel } => {
                self.pitch_wheel(value, channel);
                Vec::new()
            }
            NoteEvent::NotePressure { id, pressure, .. } => {
                self.note_pressure(id, pressure);
                Vec::new()
            }
            NoteEvent::ChannelPressure { pressure, channel } => {
                self.channel_pressure(pressure, channel);
                Vec::new()
            }
        }
    }

    fn note_on(&mut self, id: u64, note: u8, velocity: f32, channel: u8) -> Vec<VoiceChange> {
        self.age_counter += 1;
        let age = self.age_counter;
        match self.mode {
            VoiceAllocationMode::Unison => self
                .voices
                .iter_mut()
                .enumerate()
                .map(|(i, v)| {
                    let drift_cents = self.drift.next_cents(self.unison_drift_cents);
                    *v = VoiceState {
                        active: true,
                        sustained: false,
                        id,
                        note,
                        velocity,
                        channel,
                        age,
                        drift_octaves: drift_cents / 1200.0,
                        bend_semitones: v.bend_semitones,
                        main_bend_semitones: v.main_bend_semitones,
                        pressure: v.pressure,
                        main_pressure: v.main_pressure,
                    };
                    let log_pitch = self.scale.note_to_log_pitch(note as f32) + drift_cents / 1200.0;
                    VoiceChange {
                        voice_index: i,
                        gate_on: true,
                        note,
                        velocity,
                        drift_cents,
                        log_pitch,
                    }
                })
                .collect(),
            VoiceAllocationMode::Polyphonic { steal_fallback } => {
                let index = self.allocate_polyphonic(note, steal_fallback);
                let prior = self.voices[index];
                self.voices[index] = VoiceState {
                    active: true,
                    sustained: false,
                    id,
                    note,
                    velocity,
                    channel,
                    age,
                    drift_octaves: 0.0,
                    bend_semitones: prior.bend_semitones,
                    main_bend_semitones: prior.main_bend_semitones,
                    pressure: prior.pressure,
                    main_pressure: prior.main_pressure,
                };
                vec![VoiceChange {
                    voice_index: index,
                    gate_on: true,
                    note,
                    velocity,
                    drift_cents: 0.0,
                    log_pitch: self.scale.note_to_log_pitch(note as f32),
                }]
            }
            VoiceAllocationMode::Mpe => {
                let index = self.mpe_index(channel);
                let prior = self.voices[index];
                self.voices[index] = VoiceState {
                    active: true,
                    sustained: false,
                    id,
                    note,
                    velocity,
                    channel,
                    age,
                    drift_octaves: 0.0,
                    bend_semitones: prior.bend_semitones,
                    main_bend_semitones: prior.main_bend_semitones,
                    pressure: prior.pressure,
                    main_pressure: prior.main_pressure,
                };
                vec![VoiceChange {
                    voice_index: index,
                    gate_on: true,
                    note,
                    velocity,
                    drift_cents: 0.0,
                    log_pitch: self.scale.note_to_log_pitch(note as f32),
                }]
            }
        }
    }

    fn note_off(&mut self, id: u64) -> Vec<VoiceChange> {
        let mut changes = Vec::new();
        for (i, v) in self.voices.iter_mut().enumerate() {
            if !(v.active && v.id == id) {
                continue;
            }
            if self.sustain_held {
                v.sustained = true;
                continue;
            }
            v.active = false;
            changes.push(VoiceChange {
                voice_index: i,
                gate_on: false,
                note: v.note,
                velocity: 0.0,
                drift_cents: 0.0,
                log_pitch: 0.0,
            });
        }
        changes
    }

    fn sustain(&mut self, held: bool) -> Vec<VoiceChange> {
        self.sustain_held = held;
        if held {
            return Vec::new();
        }
        let mut changes = Vec::new();
        for (i, v) in self.voices.iter_mut().enumerate() {
            if v.sustained {
                v.sustained = false;
                v.active = false;
                changes.push(VoiceChange {
                    voice_index: i,
                    gate_on: false,
                    note: v.note,
                    velocity: 0.0,
                    drift_cents: 0.0,
                    log_pitch: 0.0,
                });
            }
        }
        changes
    }

    fn pitch_wheel(&mut self, value: f32, channel: u8) {
        let bend = value * self.wheel_range_semitones;
        match self.mode {
            VoiceAllocationMode::Mpe if channel == 1 => {
                for v in &mut self.voices {
                    v.main_bend_semitones = bend;
                }
            }
            VoiceAllocationMode::Mpe => {
                let idx = self.mpe_index(channel);
                if let Some(v) = self.voices.get_mut(idx) {
                    v.bend_semitones = bend;
                }
            }
            _ => {
                for v in self.voices.iter_mut().filter(|v| v.channel == channel) {
                    v.bend_semitones = bend;
                }
            }
        }
    }

    fn note_pressure(&mut self, id: u64, pressure: f32) {
        for v in self.voices.iter_mut().filter(|v| v.active && v.id == id) {
            v.pressure = pressure;
        }
    }

    fn channel_pressure(&mut self, pressure: f32, channel: u8) {
        match self.mode {
            VoiceAllocationMode::Mpe if channel == 1 => {
                for v in &mut self.voices {
                    v.main_pressure = pressure;
                }
            }
            _ => {
                for v in self.voices.iter_mut().filter(|v| v.channel == channel) {
                    v.pressure = pressure;
                }
            }
        }
    }

    fn mpe_index(&self, channel: u8) -> usize {
        (channel as usize) % self.voices.len().max(1)
    }

    fn allocate_polyphonic(&mut self, note: u8, fallback: StealFallback) -> usize {
        let n = self.voices.len();
        for offset in 0..n {
            let idx = (self.round_robin_idx + offset) % n;
            if !self.voices[idx].active {
                self.round_robin_idx = (idx + 1) % n;
                return idx;
            }
        }
        self.round_robin_idx = (self.round_robin_idx + 1) % n;
        self.steal(note, fallback)
    }

    /// Picks a voice to reclaim when every copy is busy. Prefers a voice
    /// that isn't currently held by the sustain pedal; falls back to the
    /// globally oldest one if every voice is sustained.
    fn steal(&self, note: u8, fallback: StealFallback) -> usize {
        let candidates = |sustained: bool| {
            self.voices
                .iter()
                .enumerate()
                .filter(move |(_, v)| v.sustained == sustained)
        };
        let pick = |mut it: Box<dyn Iterator<Item = (usize, &VoiceState)> + '_>| match fallback {
            StealFallback::Oldest => it.min_by_key(|(_, v)| v.age).map(|(i, _)| i),
            StealFallback::NearestNote => it
                .min_by_key(|(_, v)| (v.note as i16 - note as i16).unsigned_abs())
                .map(|(i, _)| i),
        };
        pick(Box::new(candidates(false)))
            .or_else(|| pick(Box::new(candidates(true))))
            .unwrap_or(0)
    }

    pub fn is_active(&self, voice_index: usize) -> bool {
        self.voices.get(voice_index).map(|v| v.active).unwrap_or(false)
    }

    fn current_pitch(&self, v: &VoiceState) -> f32 {
        self.scale.note_to_log_pitch(v.note as f32)
            + v.drift_octaves
            + (v.bend_semitones + v.main_bend_semitones) / 12.0
    }

    fn current_pressure(&self, v: &VoiceState) -> f32 {
        (v.pressure + v.main_pressure).clamp(0.0, 1.0)
    }

    fn voice_signal(&self, v: &VoiceState) -> VoiceSignal {
        VoiceSignal {
            pitch: self.current_pitch(v),
            gate: if v.active { 1.0 } else { 0.0 },
            velocity: v.velocity,
            pressure: self.current_pressure(v),
        }
    }

    /// Drains `pending`, routes each event in timestamp order, and renders
    /// the resulting per-voice change lists into this vector's dense
    /// pitch/gate/velocity/pressure outputs, ramping linearly from each
    /// voice's previous value.
    fn route_vector(&mut self) {
        let vector_size = self.vector_size.max(1);
        for voice_scratch in &mut self.change_scratch {
            voice_scratch.clear();
        }

        self.pending.sort_by_key(|(offset, _)| *offset);
        let events = std::mem::take(&mut self.pending);
        for (offset, event) in &events {
            let offset = (*offset).min(vector_size - 1);
            match event {
                NoteEvent::Controller { .. }
                | NoteEvent::PitchWheel { .. }
                | NoteEvent::NotePressure { .. }
                | NoteEvent::ChannelPressure { .. } => {
                    self.handle(*event);
                    for (i, v) in self.voices.iter().enumerate() {
                        if v.active {
                            self.change_scratch[i].push((offset, self.voice_signal(v)));
                        }
                    }
                }
                _ => {
                    for change in self.handle(*event) {
                        if let Some(v) = self.voices.get(change.voice_index) {
                            let signal = self.voice_signal(v);
                            self.change_scratch[change.voice_index].push((offset, signal));
                        }
                    }
                }
            }
        }
        self.pending = events;
        self.pending.clear();

        for voice_index in 0..self.voices.len() {
            let points = std::mem::take(&mut self.change_scratch[voice_index]);
            self.write_voice_signal(voice_index, vector_size, &points);
            self.change_scratch[voice_index] = points;
        }
    }

    fn write_voice_signal(&mut self, voice_index: usize, vector_size: usize, points: &[(usize, VoiceSignal)]) {
        let start = self.last_values[voice_index];
        let mut prev_offset = 0usize;
        let mut prev_value = start;

        for scratch in &mut self.channel_scratch {
            if scratch.len() != vector_size {
                scratch.resize(vector_size, 0.0);
            }
        }

        let ramp_to = |scratch: &mut [Vec<f32>; 4], from_offset: usize, from: VoiceSignal, to_offset: usize, to: VoiceSignal| {
            let span = to_offset.saturating_sub(from_offset).max(1) as f32;
            for sample in from_offset..=to_offset.min(vector_size - 1) {
                let t = (sample - from_offset) as f32 / span;
                scratch[0][sample] = from.pitch + (to.pitch - from.pitch) * t;
                scratch[1][sample] = from.gate + (to.gate - from.gate) * t;
                scratch[2][sample] = from.velocity + (to.velocity - from.velocity) * t;
                scratch[3][sample] = from.pressure + (to.pressure - from.pressure) * t;
            }
        };

        for &(offset, value) in points {
            ramp_to(&mut self.channel_scratch, prev_offset, prev_value, offset, value);
            prev_offset = offset;
            prev_value = value;
        }
        if prev_offset < vector_size - 1 {
            ramp_to(&mut self.channel_scratch, prev_offset, prev_value, vector_size - 1, prev_value);
        }

        self.last_values[voice_index] = prev_value;

        let base = 4 * voice_index;
        for channel in 0..4 {
            if let Some(out) = self.io.output(base + channel) {
                out.borrow_mut().as_mut_slice().copy_from_slice(&self.channel_scratch[channel]);
            }
        }
    }
}

impl Proc for EventRouter {
    fn id(&self) -> ProcId {
        self.id
    }

    fn class_name(&self) -> &'static str {
        "event_router"
    }

    fn instance_name(&self) -> &str {
        &self.name
    }

    fn io(&self) -> &ProcIo {
        &self.io
    }

    fn io_mut(&mut self) -> &mut ProcIo {
        &mut self.io
    }

    fn prepare_to_process(&mut self, ctx: PrepareContext) -> GraphResult<()> {
        self.vector_size = ctx.vector_size;
        for scratch in &mut self.channel_scratch {
            scratch.resize(ctx.vector_size, 0.0);
        }
        Ok(())
    }

    /// Renders the vector queued via `push_events` into the dense per-voice
    /// outputs. Does not allocate: `prepare_to_process` already sized every
    /// scratch buffer this needs.
    fn process(&mut self) {
        self.route_vector();
    }

    fn clear(&mut self) {
        self.last_values.fill(VoiceSignal::default());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Rate, SignalBuffer};
    use crate::scale::EqualTemperament;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn test_scale() -> Box<dyn Scale> {
        Box::new(EqualTemperament::default())
    }

    #[test]
    fn round_robin_picks_distinct_free_voices() {
        let mut r = EventRouter::new(
            4,
            VoiceAllocationMode::Polyphonic {
                steal_fallback: StealFallback::Oldest,
            },
            test_scale(),
        );
        let c0 = r.handle(NoteEvent::NoteOn {
            id: 1,
            note: 60,
            velocity: 1.0,
            channel: 1,
        });
        let c1 = r.handle(NoteEvent::NoteOn {
            id: 2,
            note: 62,
            velocity: 1.0,
            channel: 1,
        });
        assert_ne!(c0[0].voice_index, c1[0].voice_index);
    }

    #[test]
    fn note_off_releases_matching_voice() {
        let mut r = EventRouter::new(
            2,
            VoiceAllocationMode::Polyphonic {
                steal_fallback: StealFallback::Oldest,
            },
            test_scale(),
        );
        let on = r.handle(NoteEvent::NoteOn {
            id: 1,
            note: 60,
            velocity: 1.0,
            channel: 1,
        });
        let idx = on[0].voice_index;
        assert!(r.is_active(idx));
        let off = r.handle(NoteEvent::NoteOff {
            id: 1,
            note: 60,
            channel: 1,
        });
        assert_eq!(off[0].voice_index, idx);
        assert!(!r.is_active(idx));
    }

    /// Two different sources sounding the same note number must be
    /// releasable independently: a note-off carrying a stranger's id must
    /// not touch this voice.
    #[test]
    fn note_off_with_a_different_id_does_not_release_the_voice() {
        let mut r = EventRouter::new(
            2,
            VoiceAllocationMode::Polyphonic {
                steal_fallback: StealFallback::Oldest,
            },
            test_scale(),
        );
        let on = r.handle(NoteEvent::NoteOn {
            id: 1,
            note: 60,
            velocity: 1.0,
            channel: 1,
        });
        let idx = on[0].voice_index;
        let off = r.handle(NoteEvent::NoteOff {
            id: 2,
            note: 60,
            channel: 1,
        });
        assert!(off.is_empty());
        assert!(r.is_active(idx));
    }

    #[test]
    fn sustain_pedal_holds_voice_active_until_released() {
        let mut r = EventRouter::new(
            1,
            VoiceAllocationMode::Polyphonic {
                steal_fallback: StealFallback::Oldest,
            },
            test_scale(),
        );
        r.handle(NoteEvent::Sustain(true));
        let on = r.handle(NoteEvent::NoteOn {
            id: 1,
            note: 60,
            velocity: 1.0,
            channel: 1,
        });
        let idx = on[0].voice_index;
        let off = r.handle(NoteEvent::NoteOff {
            id: 1,
            note: 60,
            channel: 1,
        });
        assert!(off.is_empty());
        assert!(r.is_active(idx));
        let release = r.handle(NoteEvent::Sustain(false));
        assert_eq!(release[0].voice_index, idx);
        assert!(!r.is_active(idx));
    }

    #[test]
    fn stealing_kicks_in_once_every_voice_is_busy() {
        let mut r = EventRouter::new(
            1,
            VoiceAllocationMode::Polyphonic {
                steal_fallback: StealFallback::Oldest,
            },
            test_scale(),
        );
        let first = r.handle(NoteEvent::NoteOn {
            id: 1,
            note: 60,
            velocity: 1.0,
            channel: 1,
        });
        let second = r.handle(NoteEvent::NoteOn {
            id: 2,
            note: 64,
            velocity: 1.0,
            channel: 1,
        });
        assert_eq!(first[0].voice_index, second[0].voice_index);
    }

    #[test]
    fn unison_drives_every_voice_together() {
        let mut r = EventRouter::new(4, VoiceAllocationMode::Unison, test_scale());
        let changes = r.handle(NoteEvent::NoteOn {
            id: 1,
            note: 60,
            velocity: 1.0,
            channel: 1,
        });
        assert_eq!(changes.len(), 4);
        assert!(changes.iter().all(|c| c.gate_on && c.note == 60));
    }

    #[test]
    fn mpe_routes_by_channel() {
        let mut r = EventRouter::new(16, VoiceAllocationMode::Mpe, test_scale());
        let a = r.handle(NoteEvent::NoteOn {
            id: 1,
            note: 60,
            velocity: 1.0,
            channel: 2,
        });
        let b = r.handle(NoteEvent::NoteOn {
            id: 2,
            note: 67,
            velocity: 1.0,
            channel: 3,
        });
        assert_ne!(a[0].voice_index, b[0].voice_index);
    }

    fn wire_outputs(r: &mut EventRouter, vector_size: usize) -> Vec<[BufferHandle; 4]> {
        let mut handles = Vec::new();
        for i in 0..r.voice_count() {
            let make = || {
                Rc::new(RefCell::new(SignalBuffer::new(
                    vector_size,
                    1,
                    Rate::Audio(48_000),
                )))
            };
            let quad: [BufferHandle; 4] = [make(), make(), make(), make()];
            for (ch, buf) in quad.iter().enumerate() {
                r.set_output(4 * i + ch, buf.clone()).unwrap();
            }
            handles.push(quad);
        }
        handles
    }

    #[test]
    fn note_on_ramps_gate_from_zero_to_one_across_the_vector() {
        let mut r = EventRouter::new(
            1,
            VoiceAllocationMode::Polyphonic {
                steal_fallback: StealFallback::Oldest,
            },
            test_scale(),
        );
        r.prepare_to_process(PrepareContext {
            sample_rate: 48_000,
            vector_size: 64,
        })
        .unwrap();
        let outputs = wire_outputs(&mut r, 64);

        r.push_events(&[(
            0,
            NoteEvent::NoteOn {
                id: 1,
                note: 69,
                velocity: 1.0,
                channel: 1,
            },
        )]);
        r.process();

        let gate = outputs[0][1].borrow();
        assert_eq!(gate.as_slice()[0], 1.0);
        assert_eq!(gate.as_slice()[63], 1.0);

        let pitch = outputs[0][0].borrow();
        // A440 (note 69) at the equal-tempered reference is octave 0.0.
        assert!((pitch.as_slice()[0] - 0.0).abs() < 1e-4);
    }

    #[test]
    fn note_off_mid_vector_ramps_gate_down_partway_through() {
        let mut r = EventRouter::new(
            1,
            VoiceAllocationMode::Polyphonic {
                steal_fallback: StealFallback::Oldest,
            },
            test_scale(),
        );
        r.prepare_to_process(PrepareContext {
            sample_rate: 48_000,
            vector_size: 64,
        })
        .unwrap();
        let outputs = wire_outputs(&mut r, 64);

        r.push_events(&[(
            0,
            NoteEvent::NoteOn {
                id: 1,
                note: 60,
                velocity: 1.0,
                channel: 1,
            },
        )]);
        r.process();
        assert_eq!(outputs[0][1].borrow().as_slice()[63], 1.0);

        r.push_events(&[(
            32,
            NoteEvent::NoteOff {
                id: 1,
                note: 60,
                channel: 1,
            },
        )]);
        r.process();

        let gate = outputs[0][1].borrow();
        assert_eq!(gate.as_slice()[0], 1.0);
        assert_eq!(gate.as_slice()[32], 0.0);
        assert_eq!(gate.as_slice()[63], 0.0);
        // Samples between the previous vector's end value and the mid-vector
        // drop should strictly decrease, not jump.
        assert!(gate.as_slice()[16] > gate.as_slice()[32]);
    }

    #[test]
    fn pitch_wheel_bends_an_active_voice_within_the_vector() {
        let mut r = EventRouter::new(
            1,
            VoiceAllocationMode::Polyphonic {
                steal_fallback: StealFallback::Oldest,
            },
            test_scale(),
        );
        r.set_pitch_wheel_range_semitones(12.0);
        r.prepare_to_process(PrepareContext {
            sample_rate: 48_000,
            vector_size: 64,
        })
        .unwrap();
        let outputs = wire_outputs(&mut r, 64);

        r.push_events(&[(
            0,
            NoteEvent::NoteOn {
                id: 1,
                note: 69,
                velocity: 1.0,
                channel: 1,
            },
        )]);
        r.process();

        r.push_events(&[(0, NoteEvent::PitchWheel { value: 1.0, channel: 1 })]);
        r.process();

        let pitch = outputs[0][0].borrow();
        assert!((pitch.as_slice()[63] - 1.0).abs() < 1e-4);
    }
}
