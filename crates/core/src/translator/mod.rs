//! The translation waterfall for a single video file.
//!
//! Case A: a target-language ASS already exists -> done.
//! Case B: a target-language SRT exists -> try to upgrade it to ASS.
//! Case C: nothing exists -> produce a subtitle from embedded streams,
//!         external sidecars or providers, translating as needed.
//! Case D: nothing anywhere -> hand the file to Whisper and report pending.

mod waterfall;

pub use waterfall::{build_video_query, TranslateOutcome, Translator};
