//! Artist/album/song resolution through the fallback chain:
//! local exact → local by MBID → local fuzzy → MusicBrainz (by MBID, then
//! search) → Last.fm → manual.

use super::policy::{AutomaticPolicy, ResolutionMode, ResolutionPolicy};
use crate::cache::{normalize, CacheKey, TtlCache};
use crate::catalog::{
    Album, Artist, CatalogStore, EntityKind, NewAlbum, NewArtist, NewSong, Origin, Song,
};
use crate::config::ResolverSettings;
use crate::matching::best_match;
use crate::remote::{
    ArtistInfo, ArtistInfoSource, MbArtist, MbRecording, MbRelease, MetadataProvider,
    ScrobbleEvent,
};
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info};

pub const NS_MB_ARTIST: &str = "mb_artist";
pub const NS_MB_ARTIST_SEARCH: &str = "mb_artist_search";
pub const NS_MB_RELEASE: &str = "mb_release";
pub const NS_MB_RELEASE_SEARCH: &str = "mb_release_search";
pub const NS_MB_RECORDING: &str = "mb_recording";
pub const NS_MB_RECORDING_SEARCH: &str = "mb_recording_search";
pub const NS_LASTFM_ARTIST_INFO: &str = "lastfm_artist_info";

/// Names and MBIDs identifying the entities of one listening event.
#[derive(Debug, Clone, Copy)]
pub struct EntityRefs<'r> {
    pub artist_name: &'r str,
    pub artist_mbid: Option<&'r str>,
    pub album_name: Option<&'r str>,
    pub album_mbid: Option<&'r str>,
    pub track_name: &'r str,
    pub track_mbid: Option<&'r str>,
}

impl<'r> From<&'r ScrobbleEvent> for EntityRefs<'r> {
    fn from(event: &'r ScrobbleEvent) -> Self {
        Self {
            artist_name: &event.artist_name,
            artist_mbid: event.artist_mbid.as_deref(),
            album_name: event.album_name.as_deref(),
            album_mbid: event.album_mbid.as_deref(),
            track_name: &event.track_name,
            track_mbid: event.track_mbid.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedIds {
    pub artist_id: Option<i64>,
    pub album_id: Option<i64>,
    pub song_id: Option<i64>,
}

impl ResolvedIds {
    pub fn is_complete(&self) -> bool {
        self.artist_id.is_some() && self.song_id.is_some()
    }
}

/// Outcome counters, reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    pub local_hits: usize,
    pub fuzzy_hits: usize,
    pub mbid_updates: usize,
    pub created_from_remote: usize,
    pub created_manual: usize,
    pub skipped: usize,
    pub errors: usize,
}

pub struct EntityResolver<'a> {
    store: &'a dyn CatalogStore,
    metadata: &'a dyn MetadataProvider,
    artist_info: Option<&'a dyn ArtistInfoSource>,
    cache: &'a mut TtlCache,
    policy: Box<dyn ResolutionPolicy + 'a>,
    settings: ResolverSettings,
    stats: ResolutionStats,
}

fn blank_to_none(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl<'a> EntityResolver<'a> {
    pub fn new(
        store: &'a dyn CatalogStore,
        metadata: &'a dyn MetadataProvider,
        cache: &'a mut TtlCache,
        policy: Box<dyn ResolutionPolicy + 'a>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            store,
            metadata,
            artist_info: None,
            cache,
            policy,
            settings,
            stats: ResolutionStats::default(),
        }
    }

    /// Enables Last.fm enrichment (subject to `enrich_with_lastfm`).
    pub fn with_artist_info(mut self, source: &'a dyn ArtistInfoSource) -> Self {
        self.artist_info = Some(source);
        self
    }

    pub fn mode(&self) -> ResolutionMode {
        self.policy.mode()
    }

    pub fn policy_mut(&mut self) -> &mut (dyn ResolutionPolicy + 'a) {
        self.policy.as_mut()
    }

    /// Replaces the current policy with the automatic one for the rest of
    /// this resolver's life.
    pub fn switch_to_automatic(&mut self) {
        self.policy = Box::new(AutomaticPolicy::new(
            self.settings.create_manual_when_automatic,
        ));
    }

    pub fn stats(&self) -> ResolutionStats {
        self.stats
    }

    /// Resolves artist, then album (when named), then song. The song is only
    /// attempted once the artist is known.
    pub fn resolve_refs(&mut self, refs: EntityRefs) -> ResolvedIds {
        let artist_id = self.resolve_or_create_artist(refs.artist_name, refs.artist_mbid);
        let Some(artist_id) = artist_id else {
            return ResolvedIds::default();
        };

        let album_name = blank_to_none(refs.album_name);
        let album_id = album_name.and_then(|album| {
            self.resolve_or_create_album(album, artist_id, refs.artist_name, refs.album_mbid)
        });
        let song_id = self.resolve_or_create_song(
            refs.track_name,
            refs.artist_name,
            album_name,
            refs.track_mbid,
        );

        ResolvedIds {
            artist_id: Some(artist_id),
            album_id,
            song_id,
        }
    }

    // =========================================================================
    // Artists
    // =========================================================================

    pub fn resolve_or_create_artist(&mut self, name: &str, mbid: Option<&str>) -> Option<i64> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let result = self.resolve_artist(name, blank_to_none(mbid));
        self.finish(EntityKind::Artist, name, result)
    }

    fn resolve_artist(&mut self, name: &str, mbid: Option<&str>) -> Result<Option<i64>> {
        if let Some(artist) = self.find_local_artist(name, mbid)? {
            self.reconcile_mbid(EntityKind::Artist, artist.id, artist.mbid.as_deref(), mbid)?;
            return Ok(Some(artist.id));
        }

        if let Some(record) = self.remote_artist(name, mbid) {
            if let Some(existing) = self.store.find_artist_by_mbid(&record.id)? {
                debug!(
                    "Artist '{}' is MusicBrainz {} already stored as #{}",
                    name, record.id, existing.id
                );
                self.stats.local_hits += 1;
                return Ok(Some(existing.id));
            }

            let mut artist = NewArtist {
                name: name.to_string(),
                mbid: Some(record.id.clone()),
                tags: record.tags.clone(),
                bio: None,
                origin: Origin::MusicBrainz,
            };
            if let Some(info) = self.lastfm_artist_info(name) {
                for tag in info.tags {
                    if !artist.tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
                        artist.tags.push(tag);
                    }
                }
                artist.bio = info.bio;
                artist.origin = artist.origin.with_online();
            }
            let id = self.store.insert_artist(&artist)?;
            info!("Created artist '{}' (#{}, {})", name, id, artist.origin);
            self.stats.created_from_remote += 1;
            return Ok(Some(id));
        }

        if let Some(info) = self.lastfm_artist_info(name) {
            let lastfm_mbid = info.mbid.as_deref().or(mbid);
            if let Some(lastfm_mbid) = lastfm_mbid {
                if let Some(existing) = self.store.find_artist_by_mbid(lastfm_mbid)? {
                    self.stats.local_hits += 1;
                    return Ok(Some(existing.id));
                }
            }
            let artist = NewArtist {
                name: name.to_string(),
                mbid: lastfm_mbid.map(str::to_string),
                tags: info.tags,
                bio: info.bio,
                origin: Origin::Online,
            };
            let id = self.store.insert_artist(&artist)?;
            info!("Created artist '{}' (#{}, online)", name, id);
            self.stats.created_from_remote += 1;
            return Ok(Some(id));
        }

        let description = format!("'{}'", name);
        if !self.confirm_manual(EntityKind::Artist, &description) {
            return Ok(None);
        }
        let id = self
            .store
            .insert_artist(&NewArtist::minimal(name, mbid, Origin::Manual))?;
        info!("Created manual artist '{}' (#{})", name, id);
        self.stats.created_manual += 1;
        Ok(Some(id))
    }

    fn find_local_artist(&mut self, name: &str, mbid: Option<&str>) -> Result<Option<Artist>> {
        if let Some(artist) = self.store.find_artist_by_name(name)? {
            self.stats.local_hits += 1;
            return Ok(Some(artist));
        }
        if let Some(mbid) = mbid {
            if let Some(artist) = self.store.find_artist_by_mbid(mbid)? {
                debug!("Artist '{}' matched by MBID as '{}'", name, artist.name);
                self.stats.local_hits += 1;
                return Ok(Some(artist));
            }
        }
        if !self.settings.fuzzy_enabled {
            return Ok(None);
        }
        let candidates = self.store.artist_names()?;
        match self.fuzzy_pick(EntityKind::Artist, name, &candidates) {
            Some(id) => self.store.get_artist(id),
            None => Ok(None),
        }
    }

    fn remote_artist(&mut self, name: &str, mbid: Option<&str>) -> Option<MbArtist> {
        if let Some(mbid) = mbid {
            let metadata = self.metadata;
            if let Some(record) =
                self.cached_lookup(NS_MB_ARTIST, mbid, || metadata.lookup_artist(mbid))
            {
                return Some(record);
            }
        }

        let query = normalize(name);
        let metadata = self.metadata;
        let results = self.cached_search(NS_MB_ARTIST_SEARCH, &[("artist", query.as_str())], || {
            metadata.search_artists(name)
        });
        let threshold = self.settings.fuzzy_threshold;
        best_match(name, results.iter().map(|a| (a.name.as_str(), a)), threshold)
            .map(|(record, score)| {
                debug!(
                    "MusicBrainz artist '{}' picked for '{}' ({:.2})",
                    record.name, name, score
                );
                record.clone()
            })
    }

    fn lastfm_artist_info(&mut self, name: &str) -> Option<ArtistInfo> {
        if !self.settings.enrich_with_lastfm {
            return None;
        }
        let source = self.artist_info?;
        let key = normalize(name);
        let params = [("artist", key.as_str())];
        if let Some(hit) = self
            .cache
            .get_as::<ArtistInfo>(NS_LASTFM_ARTIST_INFO, CacheKey::Params(&params))
        {
            return Some(hit);
        }
        let info = source.artist_info(name)?;
        self.cache
            .put_as(NS_LASTFM_ARTIST_INFO, CacheKey::Params(&params), &info);
        Some(info)
    }

    // =========================================================================
    // Albums
    // =========================================================================

    /// Resolves an album owned by `artist_id`. `artist_name` narrows the
    /// remote search.
    pub fn resolve_or_create_album(
        &mut self,
        name: &str,
        artist_id: i64,
        artist_name: &str,
        mbid: Option<&str>,
    ) -> Option<i64> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let result = self.resolve_album(name, artist_id, artist_name.trim(), blank_to_none(mbid));
        self.finish(EntityKind::Album, name, result)
    }

    fn resolve_album(
        &mut self,
        name: &str,
        artist_id: i64,
        artist_name: &str,
        mbid: Option<&str>,
    ) -> Result<Option<i64>> {
        if let Some(album) = self.find_local_album(name, artist_id, mbid)? {
            self.reconcile_mbid(EntityKind::Album, album.id, album.mbid.as_deref(), mbid)?;
            return Ok(Some(album.id));
        }

        if let Some(record) = self.remote_release(name, artist_name, mbid) {
            if let Some(existing) = self.store.find_album_by_mbid(&record.id)? {
                self.stats.local_hits += 1;
                return Ok(Some(existing.id));
            }
            let album = NewAlbum {
                name: name.to_string(),
                year: record.year(),
                track_count: record.track_count,
                mbid: Some(record.id.clone()),
                artist_id,
                origin: Origin::MusicBrainz,
            };
            let id = self.store.insert_album(&album)?;
            info!("Created album '{}' by '{}' (#{})", name, artist_name, id);
            self.stats.created_from_remote += 1;
            return Ok(Some(id));
        }

        let description = format!("'{}' by '{}'", name, artist_name);
        if !self.confirm_manual(EntityKind::Album, &description) {
            return Ok(None);
        }
        let album = NewAlbum {
            name: name.to_string(),
            year: None,
            track_count: None,
            mbid: mbid.map(str::to_string),
            artist_id,
            origin: Origin::Manual,
        };
        let id = self.store.insert_album(&album)?;
        info!("Created manual album '{}' (#{})", name, id);
        self.stats.created_manual += 1;
        Ok(Some(id))
    }

    fn find_local_album(
        &mut self,
        name: &str,
        artist_id: i64,
        mbid: Option<&str>,
    ) -> Result<Option<Album>> {
        if let Some(album) = self.store.find_album(name, artist_id)? {
            self.stats.local_hits += 1;
            return Ok(Some(album));
        }
        if let Some(mbid) = mbid {
            if let Some(album) = self.store.find_album_by_mbid(mbid)? {
                self.stats.local_hits += 1;
                return Ok(Some(album));
            }
        }
        if !self.settings.fuzzy_enabled {
            return Ok(None);
        }
        let candidates = self.store.album_names_for_artist(artist_id)?;
        match self.fuzzy_pick(EntityKind::Album, name, &candidates) {
            Some(id) => self.store.get_album(id),
            None => Ok(None),
        }
    }

    fn remote_release(
        &mut self,
        title: &str,
        artist_name: &str,
        mbid: Option<&str>,
    ) -> Option<MbRelease> {
        let metadata = self.metadata;
        if let Some(mbid) = mbid {
            if let Some(record) =
                self.cached_lookup(NS_MB_RELEASE, mbid, || metadata.lookup_release(mbid))
            {
                return Some(record);
            }
        }

        let title_key = normalize(title);
        let artist_key = normalize(artist_name);
        let results = self.cached_search(
            NS_MB_RELEASE_SEARCH,
            &[("release", title_key.as_str()), ("artist", artist_key.as_str())],
            || metadata.search_releases(title, artist_name),
        );
        let threshold = self.settings.fuzzy_threshold;
        best_match(title, results.iter().map(|r| (r.title.as_str(), r)), threshold)
            .map(|(record, _)| record.clone())
    }

    // =========================================================================
    // Songs
    // =========================================================================

    pub fn resolve_or_create_song(
        &mut self,
        title: &str,
        artist_name: &str,
        album_name: Option<&str>,
        mbid: Option<&str>,
    ) -> Option<i64> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        let result = self.resolve_song(
            title,
            artist_name.trim(),
            blank_to_none(album_name),
            blank_to_none(mbid),
        );
        self.finish(EntityKind::Song, title, result)
    }

    fn resolve_song(
        &mut self,
        title: &str,
        artist_name: &str,
        album_name: Option<&str>,
        mbid: Option<&str>,
    ) -> Result<Option<i64>> {
        if let Some(song) = self.find_local_song(title, artist_name, album_name, mbid)? {
            self.reconcile_mbid(EntityKind::Song, song.id, song.mbid.as_deref(), mbid)?;
            return Ok(Some(song.id));
        }

        if let Some(record) = self.remote_recording(title, artist_name, album_name, mbid) {
            if let Some(existing) = self.store.find_song_by_mbid(&record.id)? {
                self.stats.local_hits += 1;
                return Ok(Some(existing.id));
            }
            let album_name = album_name
                .map(str::to_string)
                .or_else(|| record.releases.first().cloned());
            let song = NewSong {
                title: title.to_string(),
                artist_name: artist_name.to_string(),
                album_name,
                mbid: Some(record.id.clone()),
                duration: record.duration_secs(),
                genre: record.tags.first().cloned(),
                origin: Origin::MusicBrainz,
            };
            let id = self.store.insert_song(&song)?;
            info!("Created song '{}' by '{}' (#{})", title, artist_name, id);
            self.stats.created_from_remote += 1;
            return Ok(Some(id));
        }

        let description = format!("'{}' by '{}'", title, artist_name);
        if !self.confirm_manual(EntityKind::Song, &description) {
            return Ok(None);
        }
        let song = NewSong {
            title: title.to_string(),
            artist_name: artist_name.to_string(),
            album_name: album_name.map(str::to_string),
            mbid: mbid.map(str::to_string),
            duration: None,
            genre: None,
            origin: Origin::Manual,
        };
        let id = self.store.insert_song(&song)?;
        info!("Created manual song '{}' (#{})", title, id);
        self.stats.created_manual += 1;
        Ok(Some(id))
    }

    fn find_local_song(
        &mut self,
        title: &str,
        artist_name: &str,
        album_name: Option<&str>,
        mbid: Option<&str>,
    ) -> Result<Option<Song>> {
        if let Some(song) = self.store.find_song(title, artist_name, album_name)? {
            self.stats.local_hits += 1;
            return Ok(Some(song));
        }
        if let Some(mbid) = mbid {
            if let Some(song) = self.store.find_song_by_mbid(mbid)? {
                self.stats.local_hits += 1;
                return Ok(Some(song));
            }
        }
        if !self.settings.fuzzy_enabled {
            return Ok(None);
        }
        let candidates = self.store
            .song_titles_for_artist(artist_name, album_name)?;
        match self.fuzzy_pick(EntityKind::Song, title, &candidates) {
            Some(id) => self.store.get_song(id),
            None => Ok(None),
        }
    }

    fn remote_recording(
        &mut self,
        title: &str,
        artist_name: &str,
        album_name: Option<&str>,
        mbid: Option<&str>,
    ) -> Option<MbRecording> {
        let metadata = self.metadata;
        if let Some(mbid) = mbid {
            if let Some(record) =
                self.cached_lookup(NS_MB_RECORDING, mbid, || metadata.lookup_recording(mbid))
            {
                return Some(record);
            }
        }

        let title_key = normalize(title);
        let artist_key = normalize(artist_name);
        let threshold = self.settings.fuzzy_threshold;

        if let Some(album) = album_name {
            let album_key = normalize(album);
            let results = self.cached_search(
                NS_MB_RECORDING_SEARCH,
                &[
                    ("recording", title_key.as_str()),
                    ("artist", artist_key.as_str()),
                    ("release", album_key.as_str()),
                ],
                || metadata.search_recordings(title, artist_name, Some(album)),
            );
            if let Some((record, _)) =
                best_match(title, results.iter().map(|r| (r.title.as_str(), r)), threshold)
            {
                return Some(record.clone());
            }
        }

        // Album titles in scrobbles are often compilations or deluxe
        // editions, so fall back to a search without them.
        let results = self.cached_search(
            NS_MB_RECORDING_SEARCH,
            &[("recording", title_key.as_str()), ("artist", artist_key.as_str())],
            || metadata.search_recordings(title, artist_name, None),
        );
        best_match(title, results.iter().map(|r| (r.title.as_str(), r)), threshold)
            .map(|(record, _)| record.clone())
    }

    // =========================================================================
    // Shared steps
    // =========================================================================

    /// Fuzzy match over `(id, name)` candidates, confirmed by the policy
    /// unless the names are equal up to case and whitespace.
    fn fuzzy_pick(
        &mut self,
        kind: EntityKind,
        query: &str,
        candidates: &[(i64, String)],
    ) -> Option<i64> {
        let ((id, candidate), score) = best_match(
            query,
            candidates.iter().map(|(id, name)| (name.as_str(), (*id, name.as_str()))),
            self.settings.fuzzy_threshold,
        )?;

        if score < 1.0 && !self.policy.confirm_fuzzy_match(kind, query, candidate, score) {
            debug!("Fuzzy {} match '{}' for '{}' rejected", kind, candidate, query);
            return None;
        }
        debug!(
            "Fuzzy {} match '{}' for '{}' ({:.2})",
            kind, candidate, query, score
        );
        self.stats.fuzzy_hits += 1;
        Some(id)
    }

    fn reconcile_mbid(
        &mut self,
        kind: EntityKind,
        id: i64,
        stored: Option<&str>,
        supplied: Option<&str>,
    ) -> Result<()> {
        let Some(supplied) = supplied else {
            return Ok(());
        };
        if stored == Some(supplied) {
            return Ok(());
        }
        match kind {
            EntityKind::Artist => self.store.update_artist_mbid(id, supplied)?,
            EntityKind::Album => self.store.update_album_mbid(id, supplied)?,
            EntityKind::Song => self.store.update_song_mbid(id, supplied)?,
        }
        info!(
            "Updated {} #{} MBID {} -> {}",
            kind,
            id,
            stored.unwrap_or("none"),
            supplied
        );
        self.stats.mbid_updates += 1;
        Ok(())
    }

    fn confirm_manual(&mut self, kind: EntityKind, description: &str) -> bool {
        if self.policy.confirm_manual(kind, description) {
            return true;
        }
        debug!("Skipped creating {} {}", kind, description);
        self.stats.skipped += 1;
        false
    }

    /// Logs and swallows local persistence errors.
    fn finish(&mut self, kind: EntityKind, name: &str, result: Result<Option<i64>>) -> Option<i64> {
        match result {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to resolve {} '{}': {:#}", kind, name, e);
                self.policy
                    .notify(&format!("Could not store {} '{}': {}", kind, name, e));
                self.stats.errors += 1;
                None
            }
        }
    }

    fn cached_lookup<T, F>(&mut self, namespace: &str, mbid: &str, fetch: F) -> Option<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Option<T>,
    {
        if let Some(hit) = self.cache.get_as::<T>(namespace, CacheKey::Id(mbid)) {
            debug!("Cache hit {}:{}", namespace, mbid);
            return Some(hit);
        }
        let record = fetch()?;
        self.cache.put_as(namespace, CacheKey::Id(mbid), &record);
        Some(record)
    }

    fn cached_search<T, F>(&mut self, namespace: &str, params: &[(&str, &str)], fetch: F) -> Vec<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Option<Vec<T>>,
    {
        if let Some(hit) = self.cache.get_as::<Vec<T>>(namespace, CacheKey::Params(params)) {
            debug!("Cache hit {} {:?}", namespace, params);
            return hit;
        }
        match fetch() {
            Some(results) => {
                self.cache
                    .put_as(namespace, CacheKey::Params(params), &results);
                results
            }
            None => Vec::new(),
        }
    }
}
