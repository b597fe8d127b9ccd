mod entity_resolver;
mod policy;

pub use entity_resolver::{
    EntityRefs, EntityResolver, ResolutionStats, ResolvedIds, NS_LASTFM_ARTIST_INFO,
    NS_MB_ARTIST, NS_MB_ARTIST_SEARCH, NS_MB_RECORDING, NS_MB_RECORDING_SEARCH, NS_MB_RELEASE,
    NS_MB_RELEASE_SEARCH,
};
pub use policy::{
    AutomaticPolicy, CheckpointDecision, InteractivePolicy, LineReader, ResolutionMode,
    ResolutionPolicy, TerminalReader,
};
