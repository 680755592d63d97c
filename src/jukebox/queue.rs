use crate::cache::AlbumKey;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateKind {
    Track {
        uri: String,
        /// Value of the grouping tag, when one is configured
        tag_value: Option<String>,
    },
    Album(AlbumKey),
}

/// One sampled item waiting to be added to the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub item: CandidateKind,
    /// 1-based position in the filtered stream it was drawn from
    pub drawn_at: usize,
}

impl Candidate {
    pub fn track(uri: impl Into<String>, tag_value: Option<String>, drawn_at: usize) -> Self {
        Self {
            item: CandidateKind::Track {
                uri: uri.into(),
                tag_value,
            },
            drawn_at,
        }
    }

    pub fn album(key: AlbumKey, drawn_at: usize) -> Self {
        Self {
            item: CandidateKind::Album(key),
            drawn_at,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match &self.item {
            CandidateKind::Track { uri, .. } => Some(uri),
            CandidateKind::Album(_) => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct JukeboxQueue {
    items: VecDeque<Candidate>,
}

impl JukeboxQueue {
    pub fn push_back(&mut self, candidate: Candidate) {
        self.items.push_back(candidate);
    }

    pub fn pop_front(&mut self) -> Option<Candidate> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.items.iter()
    }

    pub fn contains_uri(&self, uri: &str) -> bool {
        self.items.iter().any(|c| c.uri() == Some(uri))
    }

    pub fn contains_album(&self, key: &AlbumKey) -> bool {
        self.items
            .iter()
            .any(|c| matches!(&c.item, CandidateKind::Album(k) if k == key))
    }

    pub fn contains_tag(&self, value: &str) -> bool {
        self.items.iter().any(|c| {
            matches!(&c.item, CandidateKind::Track { tag_value: Some(v), .. } if v == value)
        })
    }
}

impl Extend<Candidate> for JukeboxQueue {
    fn extend<I: IntoIterator<Item = Candidate>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}
