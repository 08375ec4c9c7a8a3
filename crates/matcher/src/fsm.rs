use std::cmp::Ordering;
use std::sync::Arc;

use catalog::{ArtistIndexSet, CatalogSnapshot, MetadataResolver, SubIndex};
use cache::IndexCache;
use fuzzy_index::{FuzzyIndex, IndexError, IndexResult};
use tracing::{debug, error, instrument};

use crate::{MatchError, MatchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Start,
    ArtistNameCheck,
    ArtistSearch,
    CleanArtistName,
    StupidArtistSearch,
    SelectArtistMatch,
    RecordingSearch,
    SelectRecordingMatch,
    HasReleaseArgument,
    ReleaseSearch,
    LookupCanonicalRelease,
    EvaluateMatch,
    SuccessFetchMetadata,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    NormalName,
    StupidName,
    HasMatches,
    NoMatches,
    Cleaned,
    NotCleaned,
    MeetsThreshold,
    DoesntMeetThreshold,
    Yes,
    No,
}

/// The exhaustive (state, event) -> state table. Any pair not listed here is
/// a programmer error: the FSM received an event its current state cannot
/// produce.
fn transition(state: State, event: Event) -> Option<State> {
    use Event::*;
    use State::*;
    Some(match (state, event) {
        (Start, Start) => ArtistNameCheck,
        (ArtistNameCheck, NormalName) => ArtistSearch,
        (ArtistNameCheck, StupidName) => StupidArtistSearch,
        (ArtistSearch, HasMatches) => SelectArtistMatch,
        (ArtistSearch, NoMatches) => CleanArtistName,
        (StupidArtistSearch, HasMatches) => SelectArtistMatch,
        (StupidArtistSearch, NoMatches) => Fail,
        (CleanArtistName, Cleaned) => ArtistNameCheck,
        (CleanArtistName, NotCleaned) => Fail,
        (SelectArtistMatch, MeetsThreshold) => RecordingSearch,
        (SelectArtistMatch, DoesntMeetThreshold) => Fail,
        (RecordingSearch, HasMatches) => SelectRecordingMatch,
        (RecordingSearch, NoMatches) => SelectArtistMatch,
        (SelectRecordingMatch, MeetsThreshold) => HasReleaseArgument,
        (SelectRecordingMatch, DoesntMeetThreshold) => SelectArtistMatch,
        (HasReleaseArgument, Yes) => ReleaseSearch,
        (HasReleaseArgument, No) => LookupCanonicalRelease,
        (ReleaseSearch, HasMatches) => EvaluateMatch,
        (ReleaseSearch, NoMatches) => SelectArtistMatch,
        (LookupCanonicalRelease, HasMatches) => EvaluateMatch,
        (LookupCanonicalRelease, NoMatches) => Fail,
        (EvaluateMatch, MeetsThreshold) => SuccessFetchMetadata,
        (EvaluateMatch, DoesntMeetThreshold) => SelectRecordingMatch,
        _ => return None,
    })
}

/// Invokes the external name-cleaning heuristic that `clean_artist_name`
/// delegates to. The core treats this as a narrow collaborator (spec.md
/// §1); a deployment plugs in its own normalization rules here.
pub trait ArtistNameCleaner {
    fn clean_artist(&self, name: &str) -> String;
}

/// A cleaner that never changes its input, so `clean_artist_name` always
/// falls straight through to `fail`. Used when no real cleaner is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopArtistNameCleaner;

impl ArtistNameCleaner for NoopArtistNameCleaner {
    fn clean_artist(&self, name: &str) -> String {
        name.to_string()
    }
}

/// The four confidence thresholds plus the algorithm constants named in
/// spec.md §6. Changing any of these is a deliberate, risk-accepting
/// operator action (see [`MatcherThresholds::validate`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatcherThresholds {
    pub artist_threshold: f32,
    pub release_threshold: f32,
    pub recording_threshold: f32,
    pub stupid_artist_threshold: f32,
}

impl Default for MatcherThresholds {
    fn default() -> Self {
        Self {
            artist_threshold: 0.7,
            release_threshold: 0.7,
            recording_threshold: 0.7,
            stupid_artist_threshold: 0.7,
        }
    }
}

fn search_or_empty(
    index: &FuzzyIndex,
    query: &str,
    min_confidence: f32,
    source_tag: char,
) -> Result<Vec<IndexResult>, MatchError> {
    if query.is_empty() {
        return Ok(Vec::new());
    }
    match index.search(query, min_confidence, source_tag) {
        Ok(results) => Ok(results),
        Err(IndexError::NotBuilt) => Ok(Vec::new()),
        Err(e) => Err(MatchError::Index(e)),
    }
}

/// One worker's FSM plus its catalog handle. Construct one per OS worker
/// thread; the Artist Index Set and Index Cache are shared across workers,
/// the `CatalogSnapshot`/`MetadataResolver` handle is this worker's own.
pub struct Matcher<C: ArtistNameCleaner = NoopArtistNameCleaner> {
    artist_index: Arc<ArtistIndexSet>,
    cache: Arc<IndexCache>,
    snapshot: CatalogSnapshot,
    metadata: MetadataResolver,
    cleaner: C,
    thresholds: MatcherThresholds,

    artist_query: String,
    artist_encoded_name: String,
    /// Set by `artist_name_check`; governs how `recording_search` handles a
    /// missing sub-index blob (spec.md §7's `SubIndexMissing`: a clean
    /// no-match on the stupid path, an internal-inconsistency error
    /// everywhere else).
    artist_is_stupid_path: bool,
    release_query: Option<String>,
    recording_query: String,

    artist_matches: Vec<IndexResult>,
    artist_match_index: Option<usize>,
    current_artist_id: u32,

    sub_index: Option<Arc<SubIndex>>,
    recording_matches: Vec<IndexResult>,
    recording_match_index: Option<usize>,

    release_matches: Vec<IndexResult>,
    release_match_index: Option<usize>,

    matched_link: Option<catalog::Link>,
    confidence: f32,
}

impl<C: ArtistNameCleaner> Matcher<C> {
    pub fn new(
        artist_index: Arc<ArtistIndexSet>,
        cache: Arc<IndexCache>,
        snapshot: CatalogSnapshot,
        cleaner: C,
        thresholds: MatcherThresholds,
    ) -> Self {
        let metadata = MetadataResolver::new(snapshot.clone());
        Self {
            artist_index,
            cache,
            snapshot,
            metadata,
            cleaner,
            thresholds,
            artist_query: String::new(),
            artist_encoded_name: String::new(),
            artist_is_stupid_path: false,
            release_query: None,
            recording_query: String::new(),
            artist_matches: Vec::new(),
            artist_match_index: None,
            current_artist_id: 0,
            sub_index: None,
            recording_matches: Vec::new(),
            recording_match_index: None,
            release_matches: Vec::new(),
            release_match_index: None,
            matched_link: None,
            confidence: 0.0,
        }
    }

    fn reset(&mut self, artist_credit_name: &str, release_name: Option<&str>, recording_name: &str) {
        self.artist_query = artist_credit_name.to_string();
        self.artist_encoded_name.clear();
        self.artist_is_stupid_path = false;
        self.release_query = release_name
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self.recording_query = recording_name.to_string();
        self.artist_matches.clear();
        self.artist_match_index = None;
        self.current_artist_id = 0;
        self.sub_index = None;
        self.recording_matches.clear();
        self.recording_match_index = None;
        self.release_matches.clear();
        self.release_match_index = None;
        self.matched_link = None;
        self.confidence = 0.0;
    }

    /// Run the FSM end to end for one query. Resets all per-query state on
    /// entry, matching spec.md §3's "Matcher FSM state: per-query, resets to
    /// initial on every new search."
    #[instrument(skip(self), fields(artist = %artist_credit_name, recording = %recording_name))]
    pub fn search(
        &mut self,
        artist_credit_name: &str,
        release_name: Option<&str>,
        recording_name: &str,
    ) -> Result<Option<MatchResult>, MatchError> {
        self.reset(artist_credit_name, release_name, recording_name);

        let mut state = State::Start;
        let mut event = Event::Start;
        loop {
            state = transition(state, event).ok_or(MatchError::ProgrammerError { state, event })?;
            match state {
                State::ArtistNameCheck => event = self.do_artist_name_check(),
                State::ArtistSearch => event = self.do_artist_search()?,
                State::CleanArtistName => event = self.do_clean_artist_name(),
                State::StupidArtistSearch => event = self.do_stupid_artist_search()?,
                State::SelectArtistMatch => event = self.do_select_artist_match(),
                State::RecordingSearch => event = self.do_recording_search()?,
                State::SelectRecordingMatch => event = self.do_select_recording_match(),
                State::HasReleaseArgument => event = self.do_has_release_argument(),
                State::ReleaseSearch => event = self.do_release_search()?,
                State::LookupCanonicalRelease => event = self.do_lookup_canonical_release()?,
                State::EvaluateMatch => event = self.do_evaluate_match()?,
                State::SuccessFetchMetadata => return self.do_success_fetch_metadata(),
                State::Fail => return Ok(None),
                State::Start => unreachable!("transition never re-enters Start"),
            }
        }
    }

    fn do_artist_name_check(&mut self) -> Event {
        let normal = encode::encode(&self.artist_query);
        if !normal.is_empty() {
            self.artist_encoded_name = normal;
            self.artist_is_stupid_path = false;
            Event::NormalName
        } else {
            self.artist_encoded_name = encode::encode_stupid(&self.artist_query);
            self.artist_is_stupid_path = true;
            Event::StupidName
        }
    }

    fn do_artist_search(&mut self) -> Result<Event, MatchError> {
        let mut matches = search_or_empty(
            &self.artist_index.single,
            &self.artist_encoded_name,
            0.0,
            's',
        )?;
        matches.extend(search_or_empty(
            &self.artist_index.multiple,
            &self.artist_encoded_name,
            0.0,
            'm',
        )?);
        matches.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));

        let has_matches = !matches.is_empty();
        self.artist_matches = matches;
        self.artist_match_index = None;
        Ok(if has_matches { Event::HasMatches } else { Event::NoMatches })
    }

    fn do_clean_artist_name(&mut self) -> Event {
        let cleaned = self.cleaner.clean_artist(&self.artist_query);
        if cleaned != self.artist_query {
            self.artist_query = cleaned;
            Event::Cleaned
        } else {
            Event::NotCleaned
        }
    }

    fn do_stupid_artist_search(&mut self) -> Result<Event, MatchError> {
        let matches = search_or_empty(
            &self.artist_index.stupid,
            &self.artist_encoded_name,
            self.thresholds.stupid_artist_threshold,
            'x',
        )?;
        let has_matches = !matches.is_empty();
        self.artist_matches = matches;
        self.artist_match_index = None;
        Ok(if has_matches { Event::HasMatches } else { Event::NoMatches })
    }

    fn do_select_artist_match(&mut self) -> Event {
        let next_index = self.artist_match_index.map_or(0, |i| i + 1);
        self.artist_match_index = Some(next_index);

        match self.artist_matches.get(next_index) {
            Some(m) if m.confidence >= self.thresholds.artist_threshold => {
                self.current_artist_id = m.external_id;
                // Advancing to a (possibly new) artist candidate invalidates
                // any cached recording matches and sub-index borrow; the next
                // recording_search re-fetches rather than reusing either.
                self.recording_matches.clear();
                self.recording_match_index = None;
                self.sub_index = None;
                Event::MeetsThreshold
            }
            _ => Event::DoesntMeetThreshold,
        }
    }

    fn load_sub_index(&self, artist_credit_id: u32) -> Result<Arc<SubIndex>, MatchError> {
        if let Some(sub_index) = self.cache.get(artist_credit_id) {
            return Ok(sub_index);
        }
        let blob = self
            .snapshot
            .load_index_blob(artist_credit_id as i64)?
            .ok_or(MatchError::SubIndexMissing(artist_credit_id))?;
        let sub_index =
            SubIndex::load(&blob[..]).map_err(|e| MatchError::DeserializeCorrupt(e.to_string()))?;
        let sub_index = Arc::new(sub_index);
        self.cache.add(artist_credit_id, Arc::clone(&sub_index));
        Ok(sub_index)
    }

    fn do_recording_search(&mut self) -> Result<Event, MatchError> {
        let sub_index = match self.load_sub_index(self.current_artist_id) {
            Ok(sub_index) => sub_index,
            Err(MatchError::SubIndexMissing(id)) if self.artist_is_stupid_path => {
                debug!(
                    artist_credit_id = id,
                    "sub_index missing for stupid-path artist; treating as no-match"
                );
                self.sub_index = None;
                self.recording_matches.clear();
                self.recording_match_index = None;
                return Ok(Event::NoMatches);
            }
            Err(MatchError::SubIndexMissing(id)) => {
                error!(
                    artist_credit_id = id,
                    "sub_index missing for non-stupid-path artist; internal inconsistency"
                );
                return Err(MatchError::SubIndexMissing(id));
            }
            Err(e) => return Err(e),
        };
        let encoded_recording = encode::encode(&self.recording_query);
        let matches = search_or_empty(
            &sub_index.recording_index,
            &encoded_recording,
            self.thresholds.recording_threshold,
            'c',
        )?;

        let has_matches = !matches.is_empty();
        self.sub_index = Some(sub_index);
        self.recording_matches = matches;
        self.recording_match_index = None;
        debug!(artist_credit_id = self.current_artist_id, has_matches, "recording_search");
        Ok(if has_matches { Event::HasMatches } else { Event::NoMatches })
    }

    fn do_select_recording_match(&mut self) -> Event {
        let next_index = self.recording_match_index.map_or(0, |i| i + 1);
        self.recording_match_index = Some(next_index);

        match self.recording_matches.get(next_index) {
            Some(m) if m.confidence >= self.thresholds.recording_threshold => Event::MeetsThreshold,
            _ => Event::DoesntMeetThreshold,
        }
    }

    fn do_has_release_argument(&self) -> Event {
        if self.release_query.is_some() {
            Event::Yes
        } else {
            Event::No
        }
    }

    fn do_release_search(&mut self) -> Result<Event, MatchError> {
        let sub_index = self
            .sub_index
            .as_ref()
            .ok_or(MatchError::InvariantViolated("set by recording_search"))?;
        let encoded_release = encode::encode(self.release_query.as_deref().unwrap_or(""));
        let mut matches = search_or_empty(
            &sub_index.release_index,
            &encoded_release,
            self.thresholds.release_threshold,
            'l',
        )?;
        matches.truncate(1);

        let has_matches = !matches.is_empty();
        self.release_matches = matches;
        self.release_match_index = Some(0);
        Ok(if has_matches { Event::HasMatches } else { Event::NoMatches })
    }

    fn do_lookup_canonical_release(&mut self) -> Result<Event, MatchError> {
        let recording_match = self.current_recording_match()?;
        let sub_index = self
            .sub_index
            .as_ref()
            .ok_or(MatchError::InvariantViolated("set by recording_search"))?;
        let best_link = sub_index
            .links
            .get(&recording_match.result_index)
            .and_then(|links| links.iter().min_by_key(|link| link.rank));

        Ok(match best_link {
            Some(link) => {
                self.release_matches = vec![IndexResult {
                    external_id: link.release_catalog_id,
                    result_index: 0,
                    confidence: 1.0,
                    source_tag: 'r',
                }];
                self.release_match_index = Some(0);
                Event::HasMatches
            }
            None => Event::NoMatches,
        })
    }

    fn current_recording_match(&self) -> Result<IndexResult, MatchError> {
        let index = self
            .recording_match_index
            .ok_or(MatchError::InvariantViolated("select_recording_match ran first"))?;
        Ok(self.recording_matches[index].clone())
    }

    fn current_release_match(&self) -> Result<IndexResult, MatchError> {
        let index = self.release_match_index.ok_or(MatchError::InvariantViolated(
            "release_search or lookup_canonical_release ran first",
        ))?;
        Ok(self.release_matches[index].clone())
    }

    fn do_evaluate_match(&mut self) -> Result<Event, MatchError> {
        let recording_match = self.current_recording_match()?;
        let release_match = self.current_release_match()?;
        let sub_index = self
            .sub_index
            .as_ref()
            .ok_or(MatchError::InvariantViolated("set by recording_search"))?;

        let link = sub_index.links.get(&recording_match.result_index).and_then(|links| {
            if release_match.source_tag == 'r' {
                links
                    .binary_search_by_key(&release_match.external_id, |link| link.release_catalog_id)
                    .ok()
                    .map(|i| &links[i])
            } else {
                links.iter().find(|link| link.release_position == release_match.result_index)
            }
        });

        Ok(match link {
            Some(link) => {
                self.matched_link = Some(link.clone());
                self.confidence = (recording_match.confidence + release_match.confidence) / 2.0;
                Event::MeetsThreshold
            }
            None => Event::DoesntMeetThreshold,
        })
    }

    fn do_success_fetch_metadata(&self) -> Result<Option<MatchResult>, MatchError> {
        let link = self
            .matched_link
            .as_ref()
            .ok_or(MatchError::InvariantViolated("set by evaluate_match"))?;
        let resolved = self.metadata.resolve(link.release_catalog_id, link.recording_catalog_id)?;
        Ok(resolved.map(|m| MatchResult {
            artist_credit_id: m.artist_credit_id,
            artist_credit_name: m.artist_credit_name,
            artist_credit_mbids: m.artist_credit_mbids,
            release_id: m.release_id,
            release_name: m.release_name,
            release_mbid: m.release_mbid,
            recording_id: m.recording_id,
            recording_name: m.recording_name,
            recording_mbid: m.recording_mbid,
            confidence: self.confidence,
        }))
    }
}
