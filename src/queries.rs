//! Search query banks and the bounded history that keeps runs from repeating
//! themselves.

use crate::classify::TargetArea;
use crate::error::Result;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;

pub(crate) const DEFAULT_HISTORY_LEN: usize = 30;
pub(crate) const QUERIES_PER_RUN: usize = 6;

const PANTAI_TIMUR_QUERIES: &[&str] = &[
    "kilang kelapa sawit Terengganu \"Sdn Bhd\" diesel generator",
    "syarikat pembinaan Pahang excavator heavy machinery diesel",
    "kontraktor perlombongan Kelantan diesel fuel supply",
    "syarikat pengangkutan lori Kuantan fleet management diesel",
    "kilang pembuatan industri Kemaman genset backup power",
    "ladang sawit Dungun mill diesel consumption",
    "syarikat kayu Gua Musang logging diesel equipment",
    "pelabuhan Kuantan bunker marine diesel supply",
    "projek infrastruktur Terengganu diesel heavy machinery",
    "\"pembekal diesel\" Terengganu Kelantan Pahang bulk",
    "kilang petrokimia Kerteh diesel industrial fuel",
    "contractor marine vessel Terengganu diesel bunker",
    "palm oil mill Pahang diesel generator power",
    "construction company Kelantan heavy equipment fuel",
    "mining quarry Pahang diesel consumption tender",
    "logistics company Pantai Timur diesel fleet",
    "power plant Terengganu backup diesel generator",
    "factory manufacturing Kuantan industrial diesel",
];

const UTARA_QUERIES: &[&str] = &[
    "kilang industri Penang manufacturing diesel generator",
    "syarikat pembinaan Perak heavy machinery diesel",
    "ladang sawit Kedah palm oil mill diesel",
    "logistik pengangkutan Butterworth fleet diesel",
    "power station Perak diesel generator backup",
    "port Penang marine bunker diesel supply",
];

const TENGAH_QUERIES: &[&str] = &[
    "kilang Shah Alam industrial diesel consumption",
    "port Klang marine bunker diesel supply",
    "syarikat pembinaan Selangor heavy equipment diesel",
    "kilang Nilai manufacturing diesel generator",
    "logistics hub Selangor fleet diesel fuel",
    "factory industrial Klang diesel power backup",
];

const SELATAN_QUERIES: &[&str] = &[
    "pelabuhan Johor Bahru bunker diesel marine",
    "kilang Pasir Gudang industrial diesel fuel",
    "ladang sawit Johor palm oil mill diesel",
    "syarikat pembinaan Melaka diesel machinery",
    "logistics port Johor diesel fleet management",
    "manufacturing factory Johor diesel generator",
];

/// Nationwide queries for the unattended scheduled run.
pub(crate) const SCHEDULED_QUERIES: &[&str] = &[
    "kilang sawit Malaysia diesel generator",
    "construction company Malaysia diesel fuel",
    "logistics trucking company Malaysia diesel",
    "plantation company Terengganu Kelantan Pahang diesel",
    "mining company Malaysia diesel equipment",
    "factory manufacturing Malaysia diesel backup generator",
    "shipping company Malaysia diesel fuel supplier",
    "quarry company Malaysia diesel machinery",
    "timber logging company Malaysia diesel",
    "agricultural farm Malaysia diesel tractor",
    "cold storage warehouse Malaysia diesel generator",
    "aquaculture fish farm Malaysia diesel pump",
    "oil palm mill Pantai Timur diesel",
    "rubber factory Malaysia diesel power",
    "cement factory Malaysia diesel truck fleet",
];

/// The bank of queries for an area. Areas without their own bank use the
/// east-coast one.
pub(crate) fn query_bank(area: TargetArea) -> &'static [&'static str] {
    match area {
        TargetArea::Utara => UTARA_QUERIES,
        TargetArea::Tengah => TENGAH_QUERIES,
        TargetArea::Selatan => SELATAN_QUERIES,
        TargetArea::All | TargetArea::PantaiTimur | TargetArea::Sabah | TargetArea::Sarawak => {
            PANTAI_TIMUR_QUERIES
        }
    }
}

/// Bounded FIFO of recently issued queries, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct QueryHistory {
    capacity: usize,
    entries: VecDeque<String>,
}

impl Default for QueryHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_LEN)
    }
}

impl QueryHistory {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub(crate) fn contains(&self, query: &str) -> bool {
        self.entries.iter().any(|q| q == query)
    }

    /// Appends queries, dropping the oldest beyond capacity.
    pub(crate) fn record<I, S>(&mut self, queries: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for query in queries {
            self.entries.push_back(query.into());
            while self.entries.len() > self.capacity {
                self.entries.pop_front();
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Position of the most recent use; lower is older.
    fn last_used(&self, query: &str) -> Option<usize> {
        self.entries.iter().rposition(|q| q == query)
    }
}

/// Picks up to `n` queries from a bank: a shuffle of the ones not in
/// history, topped up with the least recently used if too few remain.
pub(crate) fn select_queries<R: Rng + ?Sized>(
    bank: &[&str],
    history: &QueryHistory,
    n: usize,
    rng: &mut R,
) -> Vec<String> {
    let mut fresh: Vec<&str> = bank.iter().copied().filter(|q| !history.contains(q)).collect();
    fresh.shuffle(rng);
    let mut selected: Vec<String> = fresh.into_iter().take(n).map(str::to_string).collect();

    if selected.len() < n {
        let mut stale: Vec<&str> = bank.iter().copied().filter(|q| history.contains(q)).collect();
        stale.sort_by_key(|q| history.last_used(q));
        selected.extend(stale.into_iter().take(n - selected.len()).map(str::to_string));
    }
    selected
}

/// The queries for one run. A custom query bypasses the bank; bank picks are
/// recorded in the history.
pub(crate) fn plan_queries<R: Rng + ?Sized>(
    custom: Option<&str>,
    area: TargetArea,
    history: &mut QueryHistory,
    max: usize,
    rng: &mut R,
) -> Vec<String> {
    if let Some(query) = custom.map(str::trim).filter(|q| !q.is_empty()) {
        return vec![query.to_string()];
    }
    let selected = select_queries(query_bank(area), history, max, rng);
    history.record(selected.iter().cloned());
    selected
}

/// Picks one scheduled query at random.
pub(crate) fn scheduled_query<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    SCHEDULED_QUERIES
        .choose(rng)
        .copied()
        .unwrap_or(SCHEDULED_QUERIES[0])
}

/// Per-area histories, persisted between CLI runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct QueryHistoryBook {
    #[serde(default)]
    areas: HashMap<TargetArea, QueryHistory>,
}

impl QueryHistoryBook {
    pub(crate) fn for_area(&mut self, area: TargetArea, capacity: usize) -> &mut QueryHistory {
        self.areas
            .entry(area)
            .or_insert_with(|| QueryHistory::with_capacity(capacity))
    }

    /// Loads the book, starting fresh if the file does not exist yet.
    pub(crate) async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
