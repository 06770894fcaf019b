//! Score-format sequencing and FM voice allocation for an OPL3-based MIDI
//! player: parses ten historical score-file formats (SMF, RIFF-MIDI, DMX
//! MUS, XMIDI, HMI/HMP, CMF, IMF, KLM, GMF, RSXX) into one shared event
//! model, drives playback through a deadline-based scheduler with loop and
//! branch support, and turns the resulting MIDI channel events into
//! goodness-scored OPL3 voice assignments. The chip emulation itself,
//! instrument bank loading and audio output are the host's responsibility,
//! reached only through [`voice::Opl3Interface`], which [`player::Player`]
//! drives.

#![allow(dead_code)]

#[macro_use]
mod error;
#[macro_use]
mod clamp;

mod byte_iter;
mod config;
mod constants;
mod core;
mod formats;
mod player;
mod sequencer;
mod text;
mod voice;

pub use config::{LoopCount, PlayerConfig};
pub use core::numbers;
pub use error::{Error, Result};
pub use formats::SongMetadata;
pub use player::Player;
pub use text::Text;
pub use voice::{Instrument, InstrumentBank, Opl3Interface, OperatorPatch, VoiceCategory, VolumeModel};
