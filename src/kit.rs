// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The drum kit: voices, the sounds behind them and the static tables that tie them to
//! MIDI notes, choke groups and variants.
//!
//! Every table in this module is an array indexed by a closed enum, so a lookup can't miss.

use std::fmt;

/// Number of MIDI note numbers.
const NOTE_COUNT: usize = 128;

/// A single percussion voice the kit can play.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Voice {
    Kick,
    Snare,
    SideStick,
    HiHatClosed,
    HiHatOpen,
    HiHatPedal,
    Crash,
    Ride,
    TomHigh,
    TomMid,
    TomFloor,
}

/// Per-voice static data.
struct VoiceEntry {
    name: &'static str,
    label: &'static str,
    note: u8,
    choke_group: Option<ChokeGroup>,
    variants: &'static [(&'static str, Sound)],
}

/// Indexed by `Voice as usize`.
const VOICE_TABLE: [VoiceEntry; Voice::COUNT] = [
    VoiceEntry {
        name: "kick",
        label: "Kick",
        note: 36,
        choke_group: None,
        variants: &[("default", Sound::Kick)],
    },
    VoiceEntry {
        name: "snare",
        label: "Snare",
        note: 38,
        choke_group: None,
        variants: &[("14", Sound::Snare14), ("18", Sound::Snare18)],
    },
    VoiceEntry {
        name: "side_stick",
        label: "Rim",
        note: 37,
        choke_group: None,
        variants: &[("default", Sound::SideStick)],
    },
    VoiceEntry {
        name: "hi_hat_closed",
        label: "Hi-Hat (C)",
        note: 42,
        choke_group: Some(ChokeGroup::HiHat),
        variants: &[("default", Sound::HiHatClosed)],
    },
    VoiceEntry {
        name: "hi_hat_open",
        label: "Hi-Hat (O)",
        note: 46,
        choke_group: Some(ChokeGroup::HiHat),
        variants: &[("default", Sound::HiHatOpen)],
    },
    VoiceEntry {
        name: "hi_hat_pedal",
        label: "Hi-Hat (P)",
        note: 44,
        choke_group: Some(ChokeGroup::HiHat),
        variants: &[("default", Sound::HiHatPedal)],
    },
    VoiceEntry {
        name: "crash",
        label: "Crash",
        note: 49,
        choke_group: None,
        variants: &[("1", Sound::Crash1), ("2", Sound::Crash2)],
    },
    VoiceEntry {
        name: "ride",
        label: "Ride",
        note: 51,
        choke_group: None,
        variants: &[("default", Sound::Ride)],
    },
    VoiceEntry {
        name: "tom_high",
        label: "High Tom",
        note: 48,
        choke_group: None,
        variants: &[("default", Sound::TomHigh)],
    },
    VoiceEntry {
        name: "tom_mid",
        label: "Mid Tom",
        note: 45,
        choke_group: None,
        variants: &[("default", Sound::TomMid)],
    },
    VoiceEntry {
        name: "tom_floor",
        label: "Floor Tom",
        note: 41,
        choke_group: None,
        variants: &[("default", Sound::TomFloor)],
    },
];

static VOICES: [VoiceEntry; Voice::COUNT] = VOICE_TABLE;

/// Note number -> voice, built from the voice table at compile time.
const ROUTES: [Option<Voice>; NOTE_COUNT] = build_routes();

const fn build_routes() -> [Option<Voice>; NOTE_COUNT] {
    let mut routes = [None; NOTE_COUNT];
    let mut i = 0;
    while i < Voice::COUNT {
        let voice = Voice::ALL[i];
        let note = VOICE_TABLE[i].note as usize;
        // Two voices on one note would make the mapping ambiguous.
        assert!(routes[note].is_none(), "note mapped to two voices");
        routes[note] = Some(voice);
        i += 1;
    }
    routes
}

/// The order pads are presented in, hats and cymbals first.
const PAD_ORDER: [Voice; Voice::COUNT] = [
    Voice::HiHatClosed,
    Voice::HiHatPedal,
    Voice::HiHatOpen,
    Voice::Crash,
    Voice::Ride,
    Voice::SideStick,
    Voice::Kick,
    Voice::Snare,
    Voice::TomHigh,
    Voice::TomMid,
    Voice::TomFloor,
];

impl Voice {
    /// Number of voices in the kit.
    pub const COUNT: usize = 11;

    /// Every voice, in table order.
    pub const ALL: [Voice; Voice::COUNT] = [
        Voice::Kick,
        Voice::Snare,
        Voice::SideStick,
        Voice::HiHatClosed,
        Voice::HiHatOpen,
        Voice::HiHatPedal,
        Voice::Crash,
        Voice::Ride,
        Voice::TomHigh,
        Voice::TomMid,
        Voice::TomFloor,
    ];

    fn entry(self) -> &'static VoiceEntry {
        &VOICES[self as usize]
    }

    /// Index into per-voice tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The General MIDI percussion note for this voice.
    pub fn note(self) -> u8 {
        self.entry().note
    }

    /// The configuration/command name, e.g. `hi_hat_open`.
    pub fn name(self) -> &'static str {
        self.entry().name
    }

    /// A short human readable label for pads.
    pub fn label(self) -> &'static str {
        self.entry().label
    }

    /// The choke group the voice belongs to, if any.
    pub fn choke_group(self) -> Option<ChokeGroup> {
        self.entry().choke_group
    }

    /// The variant identifiers available for this voice. The first one is the default.
    pub fn variants(self) -> impl Iterator<Item = &'static str> {
        self.entry().variants.iter().map(|(id, _)| *id)
    }

    /// Looks up a variant index by identifier.
    pub fn variant_index(self, id: &str) -> Option<usize> {
        self.entry().variants.iter().position(|(v, _)| *v == id)
    }

    /// Returns the variant identifier at the given index, falling back to the default.
    pub fn variant_id(self, index: usize) -> &'static str {
        let variants = self.entry().variants;
        variants.get(index).unwrap_or(&variants[0]).0
    }

    /// Resolves the voice and a variant index to a concrete sound. Out of range indices
    /// resolve to the default variant.
    pub fn sound(self, variant: usize) -> Sound {
        let variants = self.entry().variants;
        variants.get(variant).unwrap_or(&variants[0]).1
    }

    /// Parses a voice from its configuration name.
    pub fn from_name(name: &str) -> Option<Voice> {
        Voice::ALL.into_iter().find(|voice| voice.name() == name)
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Routes a note number to the voice mapped to it.
pub fn route(note: u8) -> Option<Voice> {
    ROUTES.get(note as usize).copied().flatten()
}

/// A pad description for UIs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pad {
    pub voice: Voice,
    pub note: u8,
    pub label: &'static str,
}

/// Lists the pads of the kit in display order.
pub fn pads() -> Vec<Pad> {
    PAD_ORDER
        .iter()
        .map(|&voice| Pad {
            voice,
            note: voice.note(),
            label: voice.label(),
        })
        .collect()
}

/// Voices that mute each other. Triggering one member releases the others.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChokeGroup {
    HiHat,
}

impl ChokeGroup {
    /// The members of the group.
    pub fn members(self) -> &'static [Voice] {
        match self {
            ChokeGroup::HiHat => &[Voice::HiHatClosed, Voice::HiHatOpen, Voice::HiHatPedal],
        }
    }
}

/// A concrete sound: one per voice variant plus the two metronome clicks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sound {
    Kick,
    Snare14,
    Snare18,
    SideStick,
    HiHatClosed,
    HiHatOpen,
    HiHatPedal,
    Crash1,
    Crash2,
    Ride,
    TomHigh,
    TomMid,
    TomFloor,
    ClickAccent,
    ClickBeat,
}

/// Per-sound static data, indexed by `Sound as usize`.
const SOUNDS: [(&str, &str, Option<Voice>); Sound::COUNT] = [
    ("kick", "kick.wav", Some(Voice::Kick)),
    ("snare_14", "snare-14.wav", Some(Voice::Snare)),
    ("snare_18", "snare-18.wav", Some(Voice::Snare)),
    ("side_stick", "stick.wav", Some(Voice::SideStick)),
    ("hi_hat_closed", "hh-closed.wav", Some(Voice::HiHatClosed)),
    ("hi_hat_open", "hh-open.wav", Some(Voice::HiHatOpen)),
    ("hi_hat_pedal", "hh-closed.wav", Some(Voice::HiHatPedal)),
    ("crash_1", "crash.wav", Some(Voice::Crash)),
    ("crash_2", "crash.wav", Some(Voice::Crash)),
    ("ride", "ride.wav", Some(Voice::Ride)),
    ("tom_high", "tom-high.wav", Some(Voice::TomHigh)),
    ("tom_mid", "tom-mid.wav", Some(Voice::TomMid)),
    ("tom_floor", "tom-floor.wav", Some(Voice::TomFloor)),
    ("click_accent", "click-high.wav", None),
    ("click_beat", "click-low.wav", None),
];

impl Sound {
    /// Number of sounds.
    pub const COUNT: usize = 15;

    /// Every sound, in table order.
    pub const ALL: [Sound; Sound::COUNT] = [
        Sound::Kick,
        Sound::Snare14,
        Sound::Snare18,
        Sound::SideStick,
        Sound::HiHatClosed,
        Sound::HiHatOpen,
        Sound::HiHatPedal,
        Sound::Crash1,
        Sound::Crash2,
        Sound::Ride,
        Sound::TomHigh,
        Sound::TomMid,
        Sound::TomFloor,
        Sound::ClickAccent,
        Sound::ClickBeat,
    ];

    /// Index into per-sound tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The configuration name of the sound.
    pub fn name(self) -> &'static str {
        SOUNDS[self.index()].0
    }

    /// The resource the sample strategy loads for this sound unless overridden. The
    /// pedal hat and the second crash share the closed hat and crash files.
    pub fn default_resource(self) -> &'static str {
        SOUNDS[self.index()].1
    }

    /// The voice this sound belongs to. Metronome clicks don't belong to a voice.
    pub fn voice(self) -> Option<Voice> {
        SOUNDS[self.index()].2
    }

    /// Whether the sound is a metronome click.
    pub fn is_click(self) -> bool {
        self.voice().is_none()
    }

    /// Parses a sound from its configuration name.
    pub fn from_name(name: &str) -> Option<Sound> {
        Sound::ALL.into_iter().find(|sound| sound.name() == name)
    }
}

impl fmt::Display for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
