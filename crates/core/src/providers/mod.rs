//! Subtitle provider system: registry, fan-out manager, scoring and the
//! concrete provider implementations.

mod archive;
mod embedded;
mod filename;
mod legendasdivx;
mod manager;
mod podnapisi;
mod rate_limiter;
mod registry;
mod scoring;
mod titrari;
mod types;

pub use archive::{detect_archive, extract_subtitle_from_archive, ArchiveKind, ExtractedSubtitle};
pub use embedded::EmbeddedProvider;
pub use filename::{parse_filename, ParsedFilename};
pub use legendasdivx::LegendasDivxProvider;
pub use manager::{DownloadedSubtitle, ManagerError, ProviderManager, EMBEDDED_PROVIDER};
pub use podnapisi::PodnapisiProvider;
pub use rate_limiter::{RateLimitStatus, RateLimiterPool, SlidingWindow};
pub use registry::{
    ProviderRegistry, DEFAULT_AUTO_DISABLE_COOLDOWN_MIN, DEFAULT_AUTO_DISABLE_THRESHOLD,
};
pub use titrari::TitrariProvider;
pub use scoring::{is_perfect, score_candidate, should_upgrade, ScoringWeights, PERFECT_SCORE};
pub use types::{
    ConfigField, MatchSignal, ProviderError, RateBudget, SubtitleCandidate, SubtitleProvider,
    VideoQuery,
};
