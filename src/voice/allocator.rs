//! The voice allocator proper: goodness-scored voice stealing, pedal
//! bookkeeping, ageing, and the per-tick pitch/vibrato/portamento/arpeggio
//! engine, built around a flat `Vec<PhysicalVoice>` plus per-channel state.

use crate::constants::{
    CC_BANK_SELECT_LSB, CC_BANK_SELECT_MSB, CC_BRIGHTNESS, CC_EXPRESSION, CC_PAN,
    CC_PORTAMENTO, CC_PORTAMENTO_TIME, CC_SOFT_PEDAL, CC_VOLUME,
};
use crate::core::numbers::{ControlValue, MidiChannel, NoteNumber, PitchBend14, Program, Velocity};
use crate::voice::active_note::ActiveNote;
use crate::voice::channel_state::MidiChannelState;
use crate::voice::physical_voice::{self, LocationData, PhysicalVoice, MAX_USERS_PER_VOICE};
use crate::voice::pitch::{self, VolumeModel};
use crate::voice::synth_interface::{Opl3Interface, VoiceCategory};
use crate::voice::{Instrument, InstrumentBank};
use log::debug;

/// Initial "on" budget granted to a freshly allocated voice, in
/// microseconds, before arpeggio or ageing may consider it stale.
const DEFAULT_ON_BUDGET_US: i64 = 500_000;
/// "On" budget a voice needs left over to count as "recently retriggered"
/// in the goodness score's vibrato-state tie-break.
const ON_BUDGET_PLENTY_US: i64 = 200_000;
/// Microseconds of cooldown a freshly emptied voice is granted before it
/// is indistinguishable from a voice that has been silent for a while.
const DEFAULT_RELEASE_BUDGET_US: i64 = 3_000_000;
/// Minimum sounding time enforced for percussion notes so very short drum
/// hits remain audible even under heavy voice pressure.
const DRUM_MIN_TTL_S: f64 = 0.030;

fn apply_velocity_offset(velocity: Velocity, offset: i16) -> Velocity {
    Velocity::new((velocity.get() as i16 + offset).clamp(0, 127) as u8)
}

/// Compresses `(bank_msb, program)` (or, for percussion, the sounding
/// note) into one value that the goodness score can compare by equality.
/// Dropping `bank_lsb` from the identity is a deliberate simplification:
/// it only ever distinguishes variations within one already-matched
/// program, which the goodness score doesn't need to tell apart.
fn instrument_identity(bank_msb: u8, program: u8, is_percussion: bool, note: u8) -> u16 {
    if is_percussion {
        0x8000 | note as u16
    } else {
        ((bank_msb as u16) << 8) | program as u16
    }
}

/// Turns MIDI channel events into physical OPL3 voice assignments. Owns
/// sixteen [`MidiChannelState`]s and one [`PhysicalVoice`] per chip
/// channel the caller's [`Opl3Interface`] reports.
pub(crate) struct VoiceAllocator {
    volume_model: VolumeModel,
    voices: Vec<PhysicalVoice>,
    categories: Vec<VoiceCategory>,
    channels: Vec<MidiChannelState>,
    instruments: InstrumentBank,
    arpeggio_counter: u64,
    /// HMI scores retrigger an already-sounding note as a volume update
    /// instead of a fresh NoteOn; set from the detected source format.
    retrigger_as_aftertouch: bool,
}

impl VoiceAllocator {
    pub(crate) fn new(
        interface: &impl Opl3Interface,
        volume_model: VolumeModel,
        instruments: InstrumentBank,
        retrigger_as_aftertouch: bool,
    ) -> Self {
        let n = interface.num_channels();
        let categories = (0..n).map(|i| interface.channel_category(i)).collect();
        Self {
            volume_model,
            voices: vec![PhysicalVoice::default(); n],
            categories,
            channels: vec![MidiChannelState::default(); 16],
            instruments,
            arpeggio_counter: 0,
            retrigger_as_aftertouch,
        }
    }

    pub(crate) fn note_on(&mut self, interface: &mut impl Opl3Interface, channel: MidiChannel, note: NoteNumber, velocity: Velocity) {
        if velocity.get() == 0 {
            self.note_off(interface, channel, note, Velocity::new(64));
            return;
        }
        let ch_index = channel.get() as usize;
        let is_percussion = channel.get() == 9;

        if self.retrigger_as_aftertouch && self.channels[ch_index].active_notes.contains_key(&note) {
            let brightness = self.channels[ch_index].brightness_for(is_percussion);
            let volume = self.channels[ch_index].volume;
            let expression = self.channels[ch_index].expression;
            if let Some(active) = self.channels[ch_index].active_notes.get_mut(&note) {
                active.velocity = velocity;
                for voice in active.phys.into_iter().flatten() {
                    interface.touch_note(voice, velocity, volume, expression, brightness);
                }
            }
            return;
        }

        if self.channels[ch_index].active_notes.contains_key(&note) {
            self.terminate_note(interface, channel, note);
        }

        let (bank_msb, bank_lsb, program) = {
            let ch = &self.channels[ch_index];
            (ch.bank_msb, ch.bank_lsb, ch.program.get())
        };
        let instrument = if is_percussion {
            self.instruments.lookup_percussion(note.get()).cloned()
        } else {
            self.instruments.lookup(bank_msb, bank_lsb, program).cloned()
        };
        let Some(instrument) = instrument else {
            debug!("no instrument for bank {}/{} program {}, note dropped", bank_msb, bank_lsb, program);
            return;
        };

        let is_hmi = self.volume_model == VolumeModel::Hmi;
        let instrument_id = instrument_identity(bank_msb, program, is_percussion, note.get());

        let Some(primary) = self.select_voice(instrument_id, instrument.rhythm_category, is_hmi) else {
            debug!("no physical voice available for note {} on channel {}", note.get(), channel.get());
            return;
        };
        self.kill_or_evacuate(interface, primary, instrument_id);

        let mut phys = [Some(primary), None];
        if instrument.is_four_op() {
            let slave = primary + 3;
            if slave < self.voices.len() {
                self.kill_or_evacuate(interface, slave, instrument_id);
                phys[1] = Some(slave);
            }
        }

        let effective_velocity = apply_velocity_offset(velocity, instrument.velocity_offset);
        let sounding_velocity = if self.channels[ch_index].soft_pedal {
            Velocity::new((effective_velocity.get() as f64 * 0.8).round() as u8)
        } else {
            effective_velocity
        };

        let sounded_note = NoteNumber::new(instrument.fixed_note.unwrap_or(note.get()));
        let mut active = ActiveNote::new(sounded_note, sounding_velocity, instrument_id, is_percussion);
        active.finetune_semitones = instrument.finetune_semitones;
        active.phys = phys;

        interface.set_patch(primary, &instrument.patch);
        if let (Some(slave_voice), Some(slave_patch)) = (phys[1], &instrument.slave_patch) {
            interface.set_patch(slave_voice, slave_patch);
        }

        let bend = self.channels[ch_index].bend_semitones() + instrument.finetune_semitones;
        let freq = pitch::note_to_hz(self.volume_model, active.current_tone, bend);
        let brightness = self.channels[ch_index].brightness_for(is_percussion);
        for voice in phys.into_iter().flatten() {
            interface.note_on(voice, phys[1].filter(|_| voice == primary), freq);
            interface.set_pan(voice, self.channels[ch_index].pan);
            interface.touch_note(voice, sounding_velocity, self.channels[ch_index].volume, self.channels[ch_index].expression, brightness);
        }

        let fixed_sustain = instrument.fixed_sustain;
        for voice in phys.into_iter().flatten() {
            self.voices[voice].recent_instrument = Some(instrument_id);
            self.voices[voice].koff_release_budget_us = 0;
            self.voices[voice].users.push(LocationData {
                channel,
                note: note.get(),
                sustain_bits: 0,
                instrument: instrument_id,
                is_percussion,
                fixed_sustain,
                key_down: true,
                kon_budget_us: DEFAULT_ON_BUDGET_US,
                vibdelay_us: 0,
            });
        }

        self.channels[ch_index].active_notes.insert(note, active);
    }

    pub(crate) fn note_off(&mut self, interface: &mut impl Opl3Interface, channel: MidiChannel, note: NoteNumber, _velocity: Velocity) {
        let ch_index = channel.get() as usize;
        let Some(active) = self.channels[ch_index].active_notes.get(&note) else { return };
        let phys = active.phys;
        let is_percussion = active.is_percussion;

        let sustain_held = self.channels[ch_index].sustain;
        let already_sostenuto_held = phys.into_iter().flatten().any(|v| {
            self.voices[v].users.iter().any(|u| {
                u.channel == channel && u.note == note.get() && u.sustain_bits & physical_voice::SOSTENUTO_BIT != 0
            })
        });
        let fixed_sustain_any = phys.into_iter().flatten().any(|v| {
            self.voices[v].users.iter().any(|u| u.channel == channel && u.note == note.get() && u.fixed_sustain)
        });

        if sustain_held || already_sostenuto_held {
            for v in phys.into_iter().flatten() {
                if let Some(user) = self.voices[v].users.iter_mut().find(|u| u.channel == channel && u.note == note.get()) {
                    if sustain_held {
                        user.sustain_bits |= physical_voice::SUSTAIN_BIT;
                    }
                    user.key_down = false;
                }
            }
            return;
        }

        if is_percussion && !fixed_sustain_any {
            if let Some(active) = self.channels[ch_index].active_notes.get_mut(&note) {
                active.is_on_extended_lifetime = true;
                active.ttl_s = DRUM_MIN_TTL_S;
            }
            for v in phys.into_iter().flatten() {
                if let Some(user) = self.voices[v].users.iter_mut().find(|u| u.channel == channel && u.note == note.get()) {
                    user.key_down = false;
                }
            }
            return;
        }

        self.terminate_note(interface, channel, note);
    }

    pub(crate) fn set_sustain(&mut self, interface: &mut impl Opl3Interface, channel: MidiChannel, on: bool) {
        self.channels[channel.get() as usize].sustain = on;
        if !on {
            self.release_pedal_bit(interface, channel, physical_voice::SUSTAIN_BIT);
        }
    }

    pub(crate) fn set_sostenuto(&mut self, interface: &mut impl Opl3Interface, channel: MidiChannel, on: bool) {
        let ch_index = channel.get() as usize;
        let was_on = self.channels[ch_index].sostenuto;
        self.channels[ch_index].sostenuto = on;
        if on && !was_on {
            for voice in self.voices.iter_mut() {
                for user in voice.users.iter_mut() {
                    if user.channel == channel {
                        user.sustain_bits |= physical_voice::SOSTENUTO_BIT;
                    }
                }
            }
        } else if !on && was_on {
            self.release_pedal_bit(interface, channel, physical_voice::SOSTENUTO_BIT);
        }
    }

    pub(crate) fn set_soft_pedal(&mut self, channel: MidiChannel, on: bool) {
        self.channels[channel.get() as usize].soft_pedal = on;
    }

    fn release_pedal_bit(&mut self, interface: &mut impl Opl3Interface, channel: MidiChannel, bit: u8) {
        let mut dead: Vec<u8> = Vec::new();
        for voice in self.voices.iter_mut() {
            for user in voice.users.iter_mut() {
                if user.channel == channel && user.sustain_bits & bit != 0 {
                    user.sustain_bits &= !bit;
                    if user.sustain_bits == 0 && !user.key_down && !dead.contains(&user.note) {
                        dead.push(user.note);
                    }
                }
            }
        }
        for note in dead {
            self.terminate_note(interface, channel, NoteNumber::new(note));
        }
    }

    pub(crate) fn all_notes_off(&mut self, interface: &mut impl Opl3Interface, channel: MidiChannel) {
        let ch_index = channel.get() as usize;
        let notes: Vec<NoteNumber> = self.channels[ch_index].active_notes.keys().copied().collect();
        for note in notes {
            self.terminate_note(interface, channel, note);
        }
    }

    pub(crate) fn reset_all_controllers(&mut self, channel: MidiChannel) {
        let ch_index = channel.get() as usize;
        let active_notes = std::mem::take(&mut self.channels[ch_index].active_notes);
        self.channels[ch_index] = MidiChannelState::default();
        self.channels[ch_index].active_notes = active_notes;
    }

    fn terminate_note(&mut self, interface: &mut impl Opl3Interface, channel: MidiChannel, note: NoteNumber) {
        let Some(active) = self.channels[channel.get() as usize].active_notes.remove(&note) else { return };
        for v in active.phys.into_iter().flatten() {
            if let Some(pos) = self.voices[v].find_user(channel, note.get()) {
                self.voices[v].users.remove(pos);
            }
            if self.voices[v].is_empty() {
                interface.note_off(v);
                self.voices[v].koff_release_budget_us = DEFAULT_RELEASE_BUDGET_US;
            }
        }
    }

    fn select_voice(&self, instrument_id: u16, wanted_category: Option<VoiceCategory>, is_hmi: bool) -> Option<usize> {
        let mut best: Option<(usize, i64)> = None;
        for index in 0..self.voices.len() {
            let category = self.categories[index];
            let eligible = match wanted_category {
                Some(wanted) => category == wanted,
                None => matches!(category, VoiceCategory::Regular | VoiceCategory::FourOpMaster),
            };
            if !eligible {
                continue;
            }
            let score = self.voice_goodness(index, instrument_id, is_hmi);
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((index, score));
            }
        }
        best.map(|(index, _)| index)
    }

    /// Scores how good a candidate voice is to steal for `instrument_id`.
    /// Empty voices score strongly negative so they only lose to other
    /// empty voices when one is available; non-empty voices are scored by
    /// how cheaply their current users can be displaced.
    fn voice_goodness(&self, index: usize, instrument_id: u16, is_hmi: bool) -> i64 {
        let voice = &self.voices[index];
        if voice.is_empty() {
            let mut score = -voice.koff_release_budget_us / 1000 - 40_000_000;
            if !is_hmi && voice.recent_instrument == Some(instrument_id) {
                score += voice.koff_release_budget_us / 1000;
            }
            return score;
        }

        let mut score = 0i64;
        for user in &voice.users {
            if user.sustain_bits != 0 {
                score += -500_000 + user.kon_budget_us / 2;
            } else {
                score -= 4_000_000;
            }
            if user.instrument == instrument_id {
                score += 300;
                let vibrato_threshold = self.channels[user.channel.get() as usize].vibrato_delay_us;
                if user.vibdelay_us >= vibrato_threshold || user.kon_budget_us > ON_BUDGET_PLENTY_US {
                    score += 10;
                }
            }
            if user.is_percussion {
                score += 50;
            }
        }
        for neighbour in 0..self.voices.len() {
            if neighbour != index
                && self.categories[neighbour] == self.categories[index]
                && self.voices[neighbour].users.iter().any(|u| u.instrument == instrument_id)
            {
                score += 4;
            }
        }
        score
    }

    /// Clears `voice_index` for a new note, relocating still-wanted users
    /// onto a sibling voice under arpeggio where possible instead of
    /// killing them outright.
    fn kill_or_evacuate(&mut self, interface: &mut impl Opl3Interface, voice_index: usize, incoming_instrument: u16) {
        let users: Vec<LocationData> = self.voices[voice_index].users.drain(..).collect();
        for user in users {
            let worth_saving = (user.instrument == incoming_instrument && user.kon_budget_us > 0) || user.sustain_bits != 0;
            if worth_saving {
                if let Some(target) = self.find_arpeggio_target(voice_index, user.instrument) {
                    self.voices[target].users.push(user);
                    self.retarget_active_note(user.channel, user.note, voice_index, target);
                    continue;
                }
                self.voices[voice_index].users.push(user);
                continue;
            }
            interface.note_off(voice_index);
            self.clear_active_note_voice(user.channel, user.note, voice_index);
        }
        self.voices[voice_index].koff_release_budget_us = 0;
    }

    fn find_arpeggio_target(&self, exclude: usize, instrument_id: u16) -> Option<usize> {
        let category = self.categories[exclude];
        (0..self.voices.len()).find(|&i| {
            i != exclude
                && self.categories[i] == category
                && self.voices[i].users.len() < MAX_USERS_PER_VOICE
                && self.voices[i].users.iter().any(|u| u.instrument == instrument_id)
        })
    }

    fn retarget_active_note(&mut self, channel: MidiChannel, note: u8, from: usize, to: usize) {
        let ch_index = channel.get() as usize;
        if let Some(active) = self.channels[ch_index].active_notes.get_mut(&NoteNumber::new(note)) {
            for slot in active.phys.iter_mut() {
                if *slot == Some(from) {
                    *slot = Some(to);
                }
            }
        }
    }

    fn clear_active_note_voice(&mut self, channel: MidiChannel, note: u8, voice: usize) {
        let ch_index = channel.get() as usize;
        if let Some(active) = self.channels[ch_index].active_notes.get_mut(&NoteNumber::new(note)) {
            for slot in active.phys.iter_mut() {
                if *slot == Some(voice) {
                    *slot = None;
                }
            }
        }
    }

    /// Decays release/on budgets and the vibrato age counter; expires
    /// percussion notes whose minimum sounding floor has run out.
    pub(crate) fn add_age(&mut self, interface: &mut impl Opl3Interface, elapsed_us: i64) {
        for voice in self.voices.iter_mut() {
            if voice.is_empty() {
                voice.koff_release_budget_us = voice.koff_release_budget_us.saturating_sub(elapsed_us);
            } else {
                voice.koff_release_budget_us = 0;
                for user in voice.users.iter_mut() {
                    if !user.fixed_sustain {
                        user.kon_budget_us = user.kon_budget_us.saturating_sub(elapsed_us);
                    }
                    user.vibdelay_us = user.vibdelay_us.saturating_add(elapsed_us.max(0) as u32);
                }
            }
        }

        let elapsed_s = elapsed_us as f64 / 1_000_000.0;
        let mut expired: Vec<(MidiChannel, u8)> = Vec::new();
        for ch_index in 0..self.channels.len() {
            for active in self.channels[ch_index].active_notes.values_mut() {
                if active.is_on_extended_lifetime {
                    active.ttl_s -= elapsed_s;
                    if active.ttl_s <= 0.0 {
                        expired.push((MidiChannel::new(ch_index as u8), active.note.get()));
                    }
                }
            }
        }
        for (channel, note) in expired {
            self.terminate_note(interface, channel, NoteNumber::new(note));
        }
    }

    /// Re-pitches every sounding note: pitch bend, per-instrument finetune,
    /// vibrato once a note has aged past its channel's vibrato delay, and
    /// portamento glide toward the target note.
    pub(crate) fn tick_pitch(&mut self, interface: &mut impl Opl3Interface, elapsed_s: f64) {
        for ch_index in 0..self.channels.len() {
            let channel = MidiChannel::new(ch_index as u8);
            let channel_bend = self.channels[ch_index].bend_semitones();
            self.channels[ch_index].vibrato_phase += self.channels[ch_index].vibrato_speed * elapsed_s;
            let vibrato_phase = self.channels[ch_index].vibrato_phase;
            let vibrato_depth_semitones = self.channels[ch_index].vibrato_depth as f64 / 127.0 * 0.5;
            let vibrato_threshold = self.channels[ch_index].vibrato_delay_us;
            let portamento_rate = self.channels[ch_index].portamento_rate.max(0.0);

            let notes: Vec<NoteNumber> = self.channels[ch_index].active_notes.keys().copied().collect();
            for note in notes {
                if let Some(active) = self.channels[ch_index].active_notes.get_mut(&note) {
                    if active.glide_rate != 0.0 {
                        let step = portamento_rate * elapsed_s;
                        let delta = active.note_tone - active.current_tone;
                        if step <= 0.0 || delta.abs() <= step {
                            active.current_tone = active.note_tone;
                            active.glide_rate = 0.0;
                        } else {
                            active.current_tone += step * delta.signum();
                        }
                    }
                }

                let Some((current_tone, finetune, phys)) = self.channels[ch_index]
                    .active_notes
                    .get(&note)
                    .map(|active| (active.current_tone, active.finetune_semitones, active.phys))
                else {
                    continue;
                };

                let aged_enough = phys.into_iter().flatten().any(|v| {
                    self.voices[v]
                        .users
                        .iter()
                        .any(|u| u.channel == channel && u.note == note.get() && u.vibdelay_us >= vibrato_threshold)
                });

                let mut bend = channel_bend + finetune;
                if aged_enough && vibrato_depth_semitones > 0.0 {
                    bend += vibrato_phase.sin() * vibrato_depth_semitones;
                }

                let freq = pitch::note_to_hz(self.volume_model, current_tone, bend);
                for v in phys.into_iter().flatten() {
                    interface.note_on(v, None, freq);
                }
            }
        }
    }

    /// Rotates which user of an over-shared physical voice is actually
    /// sounding this tick. Voices with fewer sharers rotate faster.
    pub(crate) fn tick_arpeggio(&mut self, interface: &mut impl Opl3Interface) {
        self.arpeggio_counter = self.arpeggio_counter.wrapping_add(1);
        for voice_index in 0..self.voices.len() {
            let expired: Vec<(MidiChannel, u8)> = self.voices[voice_index]
                .users
                .iter()
                .filter(|u| !u.fixed_sustain && u.kon_budget_us <= 0)
                .map(|u| (u.channel, u.note))
                .collect();
            for (channel, note) in expired {
                self.terminate_note(interface, channel, NoteNumber::new(note));
            }

            let n_users = self.voices[voice_index].users.len();
            if n_users < 2 {
                continue;
            }
            let rate = match n_users {
                2 => 3,
                3 => 2,
                _ => 1,
            };
            let selected = (self.arpeggio_counter / rate as u64 % n_users as u64) as usize;
            let user = self.voices[voice_index].users[selected];
            let ch_index = user.channel.get() as usize;
            if let Some(active) = self.channels[ch_index].active_notes.get(&NoteNumber::new(user.note)) {
                let bend = self.channels[ch_index].bend_semitones() + active.finetune_semitones;
                let freq = pitch::note_to_hz(self.volume_model, active.current_tone, bend);
                let brightness = self.channels[ch_index].brightness_for(user.is_percussion);
                let volume = self.channels[ch_index].volume;
                let expression = self.channels[ch_index].expression;
                let pan = self.channels[ch_index].pan;
                let velocity = active.velocity;
                interface.note_on(voice_index, None, freq);
                interface.touch_note(voice_index, velocity, volume, expression, brightness);
                interface.set_pan(voice_index, pan);
            }
        }
    }

    pub(crate) fn set_program(&mut self, channel: MidiChannel, program: Program) {
        self.channels[channel.get() as usize].program = program;
    }

    pub(crate) fn set_pitch_bend(&mut self, channel: MidiChannel, value: PitchBend14) {
        self.channels[channel.get() as usize].pitch_bend = value;
    }

    pub(crate) fn set_channel_aftertouch(&mut self, channel: MidiChannel, value: ControlValue) {
        self.channels[channel.get() as usize].channel_aftertouch = value;
    }

    pub(crate) fn set_note_aftertouch(&mut self, channel: MidiChannel, note: NoteNumber, value: ControlValue) {
        self.channels[channel.get() as usize].note_aftertouch[note.get() as usize] = value.get();
    }

    /// Handles every controller except sustain/sostenuto, which need
    /// access to the realtime interface and go through their own methods.
    pub(crate) fn set_controller(&mut self, channel: MidiChannel, controller: u8, value: ControlValue) {
        let ch = &mut self.channels[channel.get() as usize];
        match controller {
            CC_VOLUME => ch.volume = value,
            CC_EXPRESSION => ch.expression = value,
            CC_PAN => ch.pan = value,
            CC_BRIGHTNESS => ch.brightness = value,
            CC_BANK_SELECT_MSB => ch.bank_msb = value.get(),
            CC_BANK_SELECT_LSB => ch.bank_lsb = value.get(),
            CC_PORTAMENTO => ch.portamento_enable = value.get() >= 64,
            CC_PORTAMENTO_TIME => ch.portamento_rate = value.get() as f64 * 2.0,
            CC_SOFT_PEDAL => ch.soft_pedal = value.get() >= 64,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::synth_interface::OperatorPatch;

    #[derive(Default)]
    struct FakeChip {
        patched: Vec<usize>,
        on: Vec<usize>,
        off: Vec<usize>,
    }

    impl Opl3Interface for FakeChip {
        fn set_patch(&mut self, voice: usize, _patch: &OperatorPatch) {
            self.patched.push(voice);
        }
        fn note_on(&mut self, voice: usize, _pair_slave_voice: Option<usize>, _freq_hz: f64) {
            self.on.push(voice);
        }
        fn note_off(&mut self, voice: usize) {
            self.off.push(voice);
        }
        fn touch_note(&mut self, _voice: usize, _velocity: Velocity, _channel_volume: ControlValue, _expression: ControlValue, _brightness: ControlValue) {}
        fn set_pan(&mut self, _voice: usize, _midi_pan: ControlValue) {}
        fn write_register(&mut self, _chip: u8, _register: u8, _value: u8) {}
        fn reset(&mut self, _sample_rate: u32) {}
        fn channel_category(&self, _voice: usize) -> VoiceCategory {
            VoiceCategory::Regular
        }
        fn num_channels(&self) -> usize {
            4
        }
        fn num_chips(&self) -> u8 {
            1
        }
        fn rhythm_mode(&self) -> bool {
            false
        }
    }

    fn bank_with_one_instrument() -> InstrumentBank {
        let mut bank = InstrumentBank::default();
        bank.insert(
            0,
            0,
            0,
            Instrument {
                patch: OperatorPatch::default(),
                slave_patch: None,
                finetune_semitones: 0.0,
                velocity_offset: 0,
                rhythm_category: None,
                fixed_note: None,
                fixed_sustain: false,
            },
        );
        bank
    }

    #[test]
    fn note_on_claims_a_voice_and_note_off_frees_it() {
        let chip = FakeChip::default();
        let mut allocator = VoiceAllocator::new(&chip, VolumeModel::Generic, bank_with_one_instrument(), false);
        let mut chip = FakeChip::default();
        let channel = MidiChannel::new(0);
        let note = NoteNumber::new(60);
        allocator.note_on(&mut chip, channel, note, Velocity::new(100));
        assert_eq!(chip.on.len(), 1);
        assert!(!allocator.voices[chip.on[0]].is_empty());
        allocator.note_off(&mut chip, channel, note, Velocity::new(64));
        assert_eq!(chip.off.len(), 1);
        assert!(allocator.voices[chip.off[0]].is_empty());
    }

    #[test]
    fn sustain_keeps_note_alive_past_note_off() {
        let chip = FakeChip::default();
        let mut allocator = VoiceAllocator::new(&chip, VolumeModel::Generic, bank_with_one_instrument(), false);
        let mut chip = FakeChip::default();
        let channel = MidiChannel::new(0);
        let note = NoteNumber::new(60);
        allocator.set_sustain(&mut chip, channel, true);
        allocator.note_on(&mut chip, channel, note, Velocity::new(100));
        allocator.note_off(&mut chip, channel, note, Velocity::new(64));
        assert!(chip.off.is_empty(), "sustain should keep the voice sounding");
        allocator.set_sustain(&mut chip, channel, false);
        assert_eq!(chip.off.len(), 1, "releasing the pedal should finish the note-off");
    }

    #[test]
    fn velocity_zero_note_on_behaves_as_note_off() {
        let chip = FakeChip::default();
        let mut allocator = VoiceAllocator::new(&chip, VolumeModel::Generic, bank_with_one_instrument(), false);
        let mut chip = FakeChip::default();
        let channel = MidiChannel::new(0);
        let note = NoteNumber::new(60);
        allocator.note_on(&mut chip, channel, note, Velocity::new(100));
        allocator.note_on(&mut chip, channel, note, Velocity::new(0));
        assert_eq!(chip.off.len(), 1);
    }
}
