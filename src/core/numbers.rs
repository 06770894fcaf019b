//! Bounded numeric newtypes for every small integer domain the sequencer and
//! voice engine pass around. Built with the [`crate::clamp!`] macro so every
//! one of these types shares the same silently-clamping construction
//! discipline rather than returning a `Result` for values that are merely
//! out of a permissive hardware range.

clamp!(MidiChannel, u8, 0, 15, 0, pub);
clamp!(NoteNumber, u8, 0, 127, 60, pub);
clamp!(Velocity, u8, 0, 127, 0, pub);
clamp!(Program, u8, 0, 127, 0, pub);
clamp!(ControlValue, u8, 0, 127, 0, pub);
clamp!(PitchBend14, u16, 0, 16383, 8192, pub);
