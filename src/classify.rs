//! Rule-based classification of free text into industry, state and region.
//!
//! All tables here are fixed and ordered; the first matching entry wins, so
//! identical input always yields identical classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse geographic grouping derived from a state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Region {
    #[serde(rename = "Pantai Timur")]
    PantaiTimur,
    #[serde(rename = "Pantai Barat")]
    PantaiBarat,
    Borneo,
    Federal,
    Unknown,
}

impl Region {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Region::PantaiTimur => "Pantai Timur",
            Region::PantaiBarat => "Pantai Barat",
            Region::Borneo => "Borneo",
            Region::Federal => "Federal",
            Region::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Malaysian states and federal territories. `Unknown` is the neutral
/// "Malaysia" marker used when nothing in the text pins a location down.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum State {
    Terengganu,
    Kelantan,
    Pahang,
    Johor,
    Perak,
    Selangor,
    #[serde(rename = "Pulau Pinang", alias = "Penang")]
    PulauPinang,
    Kedah,
    Sabah,
    Sarawak,
    #[serde(rename = "Negeri Sembilan")]
    NegeriSembilan,
    Melaka,
    Perlis,
    #[serde(rename = "Kuala Lumpur")]
    KualaLumpur,
    Putrajaya,
    Labuan,
    #[serde(rename = "Malaysia", alias = "Unknown")]
    Unknown,
}

struct StateEntry {
    state: State,
    name: &'static str,
    aliases: &'static [&'static str],
    cities: &'static [&'static str],
}

/// Known states in match order, with the city/area fragments that identify them.
const STATE_TABLE: &[StateEntry] = &[
    StateEntry {
        state: State::Terengganu,
        name: "terengganu",
        aliases: &[],
        cities: &[
            "kuala terengganu",
            "kemaman",
            "dungun",
            "kerteh",
            "marang",
            "besut",
            "setiu",
            "hulu terengganu",
        ],
    },
    StateEntry {
        state: State::Kelantan,
        name: "kelantan",
        aliases: &[],
        cities: &[
            "kota bharu",
            "gua musang",
            "tanah merah",
            "machang",
            "pasir mas",
            "tumpat",
            "bachok",
            "kuala krai",
        ],
    },
    StateEntry {
        state: State::Pahang,
        name: "pahang",
        aliases: &[],
        cities: &[
            "kuantan",
            "temerloh",
            "bentong",
            "pekan",
            "gebeng",
            "jerantut",
            "rompin",
            "raub",
            "cameron highlands",
        ],
    },
    StateEntry {
        state: State::Johor,
        name: "johor",
        aliases: &["johore"],
        cities: &[
            "johor bahru",
            "pasir gudang",
            "iskandar",
            "batu pahat",
            "muar",
            "segamat",
            "kluang",
            "pontian",
        ],
    },
    StateEntry {
        state: State::Perak,
        name: "perak",
        aliases: &[],
        cities: &[
            "ipoh",
            "taiping",
            "lumut",
            "manjung",
            "sitiawan",
            "teluk intan",
            "kampar",
        ],
    },
    StateEntry {
        state: State::Selangor,
        name: "selangor",
        aliases: &[],
        cities: &[
            "shah alam",
            "klang",
            "petaling jaya",
            "subang",
            "puchong",
            "rawang",
            "sepang",
        ],
    },
    StateEntry {
        state: State::PulauPinang,
        name: "pulau pinang",
        aliases: &["penang"],
        cities: &[
            "georgetown",
            "george town",
            "butterworth",
            "bayan lepas",
            "seberang perai",
            "nibong tebal",
        ],
    },
    StateEntry {
        state: State::Kedah,
        name: "kedah",
        aliases: &[],
        cities: &["alor setar", "sungai petani", "kulim", "langkawi", "jitra"],
    },
    StateEntry {
        state: State::Sabah,
        name: "sabah",
        aliases: &[],
        cities: &["kota kinabalu", "sandakan", "tawau", "lahad datu", "keningau"],
    },
    StateEntry {
        state: State::Sarawak,
        name: "sarawak",
        aliases: &[],
        cities: &["kuching", "miri", "sibu", "bintulu", "mukah"],
    },
    StateEntry {
        state: State::NegeriSembilan,
        name: "negeri sembilan",
        aliases: &[],
        cities: &["seremban", "nilai", "port dickson", "senawang"],
    },
    StateEntry {
        state: State::Melaka,
        name: "melaka",
        aliases: &["malacca"],
        cities: &["melaka", "ayer keroh", "alor gajah"],
    },
    StateEntry {
        state: State::Perlis,
        name: "perlis",
        aliases: &[],
        cities: &["kangar", "arau", "padang besar"],
    },
    StateEntry {
        state: State::KualaLumpur,
        name: "kuala lumpur",
        aliases: &["kl"],
        cities: &["bangsar", "cheras", "kepong", "setapak"],
    },
    StateEntry {
        state: State::Putrajaya,
        name: "putrajaya",
        aliases: &[],
        cities: &[],
    },
    StateEntry {
        state: State::Labuan,
        name: "labuan",
        aliases: &[],
        cities: &[],
    },
];

impl State {
    /// Every state the classifier can produce, excluding the neutral marker.
    #[cfg(test)]
    pub(crate) fn known() -> impl Iterator<Item = State> {
        STATE_TABLE.iter().map(|entry| entry.state)
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            State::Terengganu => "Terengganu",
            State::Kelantan => "Kelantan",
            State::Pahang => "Pahang",
            State::Johor => "Johor",
            State::Perak => "Perak",
            State::Selangor => "Selangor",
            State::PulauPinang => "Pulau Pinang",
            State::Kedah => "Kedah",
            State::Sabah => "Sabah",
            State::Sarawak => "Sarawak",
            State::NegeriSembilan => "Negeri Sembilan",
            State::Melaka => "Melaka",
            State::Perlis => "Perlis",
            State::KualaLumpur => "Kuala Lumpur",
            State::Putrajaya => "Putrajaya",
            State::Labuan => "Labuan",
            State::Unknown => "Malaysia",
        }
    }

    pub(crate) fn is_known(self) -> bool {
        self != State::Unknown
    }

    /// Total state -> region mapping.
    pub(crate) fn region(self) -> Region {
        match self {
            State::Terengganu | State::Kelantan | State::Pahang => Region::PantaiTimur,
            State::Perlis
            | State::Kedah
            | State::PulauPinang
            | State::Perak
            | State::Selangor
            | State::NegeriSembilan
            | State::Melaka
            | State::Johor => Region::PantaiBarat,
            State::Sabah | State::Sarawak => Region::Borneo,
            State::KualaLumpur | State::Putrajaya | State::Labuan => Region::Federal,
            State::Unknown => Region::Unknown,
        }
    }

    /// Resolves a free-form state name (as written by people, the LLM, or a
    /// geocoder) to a known state.
    pub(crate) fn from_name(name: &str) -> Option<State> {
        let lowered = name.trim().to_lowercase();
        let stripped = lowered
            .strip_prefix("wilayah persekutuan")
            .or_else(|| lowered.strip_prefix("federal territory of"))
            .unwrap_or(lowered.as_str())
            .trim();
        if stripped.is_empty() {
            return None;
        }
        STATE_TABLE
            .iter()
            .find(|entry| entry.name == stripped || entry.aliases.contains(&stripped))
            .map(|entry| entry.state)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A state resolved from text, with the city fragment that pinned it, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LocationMatch {
    pub state: State,
    pub city: Option<&'static str>,
}

/// Finds a location in lower-cased text: city/area names first, then state
/// names and aliases.
pub(crate) fn find_location(text_lower: &str) -> Option<LocationMatch> {
    for entry in STATE_TABLE {
        if let Some(city) = entry.cities.iter().find(|c| contains_word(text_lower, c)) {
            return Some(LocationMatch {
                state: entry.state,
                city: Some(*city),
            });
        }
    }
    STATE_TABLE
        .iter()
        .find(|entry| {
            contains_word(text_lower, entry.name)
                || entry.aliases.iter().any(|a| contains_word(text_lower, a))
        })
        .map(|entry| LocationMatch {
            state: entry.state,
            city: None,
        })
}

/// Classifies the state a piece of content refers to.
pub(crate) fn classify_state(content: &str) -> State {
    find_location(&content.to_lowercase())
        .map(|m| m.state)
        .unwrap_or(State::Unknown)
}

/// Industry labels the rule classifier can assign.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Industry {
    #[serde(rename = "Palm Oil")]
    PalmOil,
    #[serde(rename = "Oil & Gas")]
    OilAndGas,
    Mining,
    Marine,
    Manufacturing,
    Timber,
    Construction,
    Transportation,
    Agriculture,
    Fishery,
    #[serde(rename = "Power Generation")]
    PowerGeneration,
    Industrial,
}

impl Industry {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Industry::PalmOil => "Palm Oil",
            Industry::OilAndGas => "Oil & Gas",
            Industry::Mining => "Mining",
            Industry::Marine => "Marine",
            Industry::Manufacturing => "Manufacturing",
            Industry::Timber => "Timber",
            Industry::Construction => "Construction",
            Industry::Transportation => "Transportation",
            Industry::Agriculture => "Agriculture",
            Industry::Fishery => "Fishery",
            Industry::PowerGeneration => "Power Generation",
            Industry::Industrial => "Industrial",
        }
    }

    /// Whether the industry came from a keyword match rather than the default.
    pub(crate) fn is_recognized(self) -> bool {
        self != Industry::Industrial
    }
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const INDUSTRY_RULES: &[(Industry, &[&str])] = &[
    (Industry::PalmOil, &["sawit", "palm", "cpo", "mill"]),
    (
        Industry::OilAndGas,
        &[
            "petrokimia",
            "petrochemical",
            "petroleum",
            "offshore",
            "upstream",
            "downstream",
        ],
    ),
    (
        Industry::Mining,
        &["lombong", "perlombongan", "mining", "quarry", "quarries", "kuari"],
    ),
    (
        Industry::Marine,
        &["marine", "pelabuhan", "port", "bunker", "vessel", "shipping"],
    ),
    (
        Industry::Manufacturing,
        &[
            "kilang",
            "manufacturing",
            "manufacturer",
            "factory",
            "factories",
            "pembuatan",
        ],
    ),
    (Industry::Timber, &["logging", "timber", "kayu", "balak"]),
    (
        Industry::Construction,
        &["pembinaan", "construction", "kontraktor", "contractor"],
    ),
    (
        Industry::Transportation,
        &[
            "pengangkutan",
            "transport",
            "transportation",
            "logistics",
            "logistik",
            "lori",
            "lorry",
            "fleet",
            "trucking",
        ],
    ),
    (
        Industry::Agriculture,
        &["ladang", "plantation", "pertanian", "farm"],
    ),
    (
        Industry::Fishery,
        &["aquaculture", "perikanan", "ikan", "fishery", "fisheries"],
    ),
    (
        Industry::PowerGeneration,
        &["generator", "genset", "janakuasa", "power plant"],
    ),
];

/// Classifies the industry of a piece of content. Unrecognised content falls
/// back to `Industry::Industrial`.
pub(crate) fn classify_industry(content: &str) -> Industry {
    let lowered = content.to_lowercase();
    INDUSTRY_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| matches_keyword(&lowered, k)))
        .map(|(industry, _)| *industry)
        .unwrap_or(Industry::Industrial)
}

/// The area a discovery run targets. Areas group states the way the sales
/// team splits the peninsula, which is finer than `Region`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub(crate) enum TargetArea {
    All,
    PantaiTimur,
    Utara,
    Tengah,
    Selatan,
    Sabah,
    Sarawak,
}

impl TargetArea {
    pub(crate) fn label(self) -> &'static str {
        match self {
            TargetArea::All => "all",
            TargetArea::PantaiTimur => "Pantai Timur",
            TargetArea::Utara => "Utara",
            TargetArea::Tengah => "Tengah",
            TargetArea::Selatan => "Selatan",
            TargetArea::Sabah => "Sabah",
            TargetArea::Sarawak => "Sarawak",
        }
    }

    /// Whether a resolved state lies inside this area. Unknown states are
    /// never ruled out.
    pub(crate) fn covers(self, state: State) -> bool {
        if !state.is_known() {
            return true;
        }
        match self {
            TargetArea::All => true,
            TargetArea::PantaiTimur => state.region() == Region::PantaiTimur,
            TargetArea::Utara => matches!(
                state,
                State::PulauPinang | State::Perak | State::Kedah | State::Perlis
            ),
            TargetArea::Tengah => matches!(
                state,
                State::Selangor | State::KualaLumpur | State::NegeriSembilan | State::Putrajaya
            ),
            TargetArea::Selatan => matches!(state, State::Johor | State::Melaka),
            TargetArea::Sabah => matches!(state, State::Sabah | State::Labuan),
            TargetArea::Sarawak => state == State::Sarawak,
        }
    }
}

impl fmt::Display for TargetArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TargetArea {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "" | "all" | "malaysia" => Ok(TargetArea::All),
            "pantai timur" | "east coast" => Ok(TargetArea::PantaiTimur),
            "utara" | "northern" | "north" => Ok(TargetArea::Utara),
            "tengah" | "central" => Ok(TargetArea::Tengah),
            "selatan" | "southern" | "south" => Ok(TargetArea::Selatan),
            "sabah" => Ok(TargetArea::Sabah),
            "sarawak" => Ok(TargetArea::Sarawak),
            other => Err(format!("unknown target area '{}'", other)),
        }
    }
}

impl TryFrom<String> for TargetArea {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TargetArea> for String {
    fn from(area: TargetArea) -> Self {
        area.label().to_string()
    }
}

/// True if `phrase` occurs in `text` delimited by non-alphanumeric
/// characters (or the ends of the string).
pub(crate) fn contains_word(text: &str, phrase: &str) -> bool {
    occurs_at_word_start(text, phrase, |rest| {
        rest.chars().next().is_none_or(|c| !c.is_alphanumeric())
    })
}

/// Like `contains_word`, but also accepts a plural "s"/"es" ending, so
/// "mill" matches "mills" but not "million".
fn matches_keyword(text: &str, keyword: &str) -> bool {
    occurs_at_word_start(text, keyword, |rest| {
        let rest = rest
            .strip_prefix("es")
            .or_else(|| rest.strip_prefix('s'))
            .filter(|r| r.chars().next().is_none_or(|c| !c.is_alphanumeric()))
            .unwrap_or(rest);
        rest.chars().next().is_none_or(|c| !c.is_alphanumeric())
    })
}

fn occurs_at_word_start(text: &str, needle: &str, ends_ok: impl Fn(&str) -> bool) -> bool {
    if needle.is_empty() {
        return false;
    }
    text.match_indices(needle).any(|(idx, _)| {
        let starts_ok = text[..idx]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        starts_ok && ends_ok(&text[idx + needle.len()..])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_industry_first_match_wins() {
        assert_eq!(classify_industry("Kilang Sawit Kemaman"), Industry::PalmOil);
        assert_eq!(
            classify_industry("quarry operator with diesel machinery"),
            Industry::Mining
        );
        assert_eq!(
            classify_industry("syarikat pengangkutan lori"),
            Industry::Transportation
        );
        assert_eq!(classify_industry("diesel generator rental"), Industry::PowerGeneration);
        assert_eq!(classify_industry("resort and spa"), Industry::Industrial);
    }

    #[test]
    fn test_industry_keywords_respect_word_boundaries() {
        // "port" must not fire inside "transport", nor "mill" inside "million".
        assert_eq!(
            classify_industry("transport company with RM5 million fleet"),
            Industry::Transportation
        );
        assert_eq!(classify_industry("two palm oil mills"), Industry::PalmOil);
        assert_eq!(classify_industry("Kuantan port bunker"), Industry::Marine);
    }

    #[test]
    fn test_state_from_city_then_state_name() {
        assert_eq!(classify_state("ABC Sdn Bhd Kuantan"), State::Pahang);
        assert_eq!(classify_state("Located in Kota Bharu"), State::Kelantan);
        assert_eq!(classify_state("operations across Sarawak"), State::Sarawak);
        assert_eq!(classify_state("somewhere in the peninsula"), State::Unknown);
        // City match outranks an explicit state name appearing earlier in the table.
        assert_eq!(classify_state("Terengganu office, plant in Ipoh"), State::Perak);
    }

    #[test]
    fn test_state_names_need_word_boundaries() {
        // "perak" inside another word must not match
        assert_eq!(classify_state("superakademik"), State::Unknown);
    }

    #[test]
    fn test_region_total_and_stable() {
        for state in State::known() {
            let first = state.region();
            assert_ne!(first, Region::Unknown, "{} has no region", state);
            assert_eq!(first, state.region());
        }
        assert_eq!(State::Unknown.region(), Region::Unknown);
        assert_eq!(State::PulauPinang.region(), Region::PantaiBarat);
        assert_eq!(State::Labuan.region(), Region::Federal);
    }

    #[test]
    fn test_state_from_name_aliases() {
        assert_eq!(State::from_name("Penang"), Some(State::PulauPinang));
        assert_eq!(State::from_name(" pulau pinang "), Some(State::PulauPinang));
        assert_eq!(State::from_name("Malacca"), Some(State::Melaka));
        assert_eq!(
            State::from_name("Wilayah Persekutuan Kuala Lumpur"),
            Some(State::KualaLumpur)
        );
        assert_eq!(
            State::from_name("Federal Territory of Labuan"),
            Some(State::Labuan)
        );
        assert_eq!(State::from_name("Malaysia"), None);
        assert_eq!(State::from_name(""), None);
    }

    #[test]
    fn test_every_known_state_round_trips_through_its_label() {
        for state in State::known() {
            assert_eq!(State::from_name(state.label()), Some(state));
        }
    }

    #[test]
    fn test_target_area_parsing_and_coverage() {
        assert_eq!("pantai-timur".parse::<TargetArea>(), Ok(TargetArea::PantaiTimur));
        assert_eq!("ALL".parse::<TargetArea>(), Ok(TargetArea::All));
        assert!("mars".parse::<TargetArea>().is_err());

        assert!(TargetArea::PantaiTimur.covers(State::Pahang));
        assert!(!TargetArea::PantaiTimur.covers(State::Johor));
        assert!(TargetArea::PantaiTimur.covers(State::Unknown));
        assert!(TargetArea::Utara.covers(State::PulauPinang));
        assert!(TargetArea::Sabah.covers(State::Labuan));
        assert!(TargetArea::All.covers(State::Sarawak));
    }

    #[test]
    fn test_serde_uses_labels() {
        assert_eq!(
            serde_json::to_string(&State::PulauPinang).unwrap(),
            "\"Pulau Pinang\""
        );
        assert_eq!(serde_json::to_string(&State::Unknown).unwrap(), "\"Malaysia\"");
        assert_eq!(
            serde_json::to_string(&Region::PantaiTimur).unwrap(),
            "\"Pantai Timur\""
        );
        let area: TargetArea = serde_json::from_str("\"Tengah\"").unwrap();
        assert_eq!(area, TargetArea::Tengah);
    }
}
