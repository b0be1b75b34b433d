///! US state table shared by the resolver, the county cache and the CLI.
///!
///! RadioReference keys its pages by two different numeric state ids:
///! the database query id (`/apps/db/?stid=`) and the browse id used by the
///! county dropdown (`/db/browse/stid/`). Both are kept here.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A US state or the District of Columbia
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UsState {
    AL, AK, AZ, AR, CA, CO, CT, DE, DC, FL,
    GA, HI, ID, IL, IN, IA, KS, KY, LA, ME,
    MD, MA, MI, MN, MS, MO, MT, NE, NV, NH,
    NJ, NM, NY, NC, ND, OH, OK, OR, PA, RI,
    SC, SD, TN, TX, UT, VT, VA, WA, WV, WI,
    WY,
}

struct StateInfo {
    state: UsState,
    code: &'static str,
    name: &'static str,
    query_id: u32,
    browse_id: u32,
}

const fn info(state: UsState, code: &'static str, name: &'static str, query_id: u32, browse_id: u32) -> StateInfo {
    StateInfo { state, code, name, query_id, browse_id }
}

const STATES: [StateInfo; 51] = [
    info(UsState::AL, "AL", "Alabama", 1, 1),
    info(UsState::AK, "AK", "Alaska", 2, 2),
    info(UsState::AZ, "AZ", "Arizona", 3, 4),
    info(UsState::AR, "AR", "Arkansas", 4, 5),
    info(UsState::CA, "CA", "California", 5, 6),
    info(UsState::CO, "CO", "Colorado", 6, 8),
    info(UsState::CT, "CT", "Connecticut", 7, 9),
    info(UsState::DE, "DE", "Delaware", 8, 10),
    info(UsState::DC, "DC", "District of Columbia", 51, 11),
    info(UsState::FL, "FL", "Florida", 9, 12),
    info(UsState::GA, "GA", "Georgia", 10, 13),
    info(UsState::HI, "HI", "Hawaii", 11, 15),
    info(UsState::ID, "ID", "Idaho", 12, 16),
    info(UsState::IL, "IL", "Illinois", 13, 17),
    info(UsState::IN, "IN", "Indiana", 14, 18),
    info(UsState::IA, "IA", "Iowa", 15, 19),
    info(UsState::KS, "KS", "Kansas", 16, 20),
    info(UsState::KY, "KY", "Kentucky", 17, 21),
    info(UsState::LA, "LA", "Louisiana", 18, 22),
    info(UsState::ME, "ME", "Maine", 19, 23),
    info(UsState::MD, "MD", "Maryland", 20, 24),
    info(UsState::MA, "MA", "Massachusetts", 21, 25),
    info(UsState::MI, "MI", "Michigan", 22, 26),
    info(UsState::MN, "MN", "Minnesota", 23, 27),
    info(UsState::MS, "MS", "Mississippi", 24, 28),
    info(UsState::MO, "MO", "Missouri", 25, 29),
    info(UsState::MT, "MT", "Montana", 26, 30),
    info(UsState::NE, "NE", "Nebraska", 27, 31),
    info(UsState::NV, "NV", "Nevada", 28, 32),
    info(UsState::NH, "NH", "New Hampshire", 29, 33),
    info(UsState::NJ, "NJ", "New Jersey", 30, 34),
    info(UsState::NM, "NM", "New Mexico", 31, 35),
    info(UsState::NY, "NY", "New York", 32, 36),
    info(UsState::NC, "NC", "North Carolina", 33, 37),
    info(UsState::ND, "ND", "North Dakota", 34, 38),
    info(UsState::OH, "OH", "Ohio", 35, 39),
    info(UsState::OK, "OK", "Oklahoma", 36, 40),
    info(UsState::OR, "OR", "Oregon", 37, 41),
    info(UsState::PA, "PA", "Pennsylvania", 38, 42),
    info(UsState::RI, "RI", "Rhode Island", 39, 44),
    info(UsState::SC, "SC", "South Carolina", 40, 45),
    info(UsState::SD, "SD", "South Dakota", 41, 46),
    info(UsState::TN, "TN", "Tennessee", 42, 47),
    info(UsState::TX, "TX", "Texas", 43, 48),
    info(UsState::UT, "UT", "Utah", 44, 49),
    info(UsState::VT, "VT", "Vermont", 45, 50),
    info(UsState::VA, "VA", "Virginia", 46, 51),
    info(UsState::WA, "WA", "Washington", 47, 53),
    info(UsState::WV, "WV", "West Virginia", 48, 54),
    info(UsState::WI, "WI", "Wisconsin", 49, 55),
    info(UsState::WY, "WY", "Wyoming", 50, 56),
];

impl UsState {
    /// Every state in table order (alphabetical by code, DC after DE)
    pub fn all() -> impl Iterator<Item = UsState> {
        STATES.iter().map(|s| s.state)
    }

    fn info(&self) -> &'static StateInfo {
        // Table order matches declaration order
        &STATES[*self as usize]
    }

    /// Two-letter postal code, e.g. "CA"
    pub fn code(&self) -> &'static str {
        self.info().code
    }

    /// Full name, e.g. "California"
    pub fn name(&self) -> &'static str {
        self.info().name
    }

    /// Id used by the upstream database query pages
    pub fn query_id(&self) -> u32 {
        self.info().query_id
    }

    /// Id used by the upstream browse pages (county dropdown)
    pub fn browse_id(&self) -> u32 {
        self.info().browse_id
    }

    /// Parse from a postal code or a full state name (case insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        STATES
            .iter()
            .find(|info| info.code.eq_ignore_ascii_case(s) || info.name.eq_ignore_ascii_case(s))
            .map(|info| info.state)
    }

    /// Find the state whose full name appears in `text`.
    ///
    /// Longer names are tried first so that "West Virginia" wins over
    /// "Virginia" and "Arkansas" over "Kansas".
    pub fn find_name_in(text: &str) -> Option<Self> {
        let upper = text.to_uppercase();
        let mut by_len: Vec<&StateInfo> = STATES.iter().collect();
        by_len.sort_by_key(|info| std::cmp::Reverse(info.name.len()));
        by_len
            .into_iter()
            .find(|info| contains_word(&upper, &info.name.to_uppercase()))
            .map(|info| info.state)
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + needle.len()..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
    })
}

impl std::fmt::Display for UsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for UsState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UsState::parse(s).ok_or_else(|| format!("Unknown state: {}", s))
    }
}

impl Serialize for UsState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for UsState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        UsState::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("unknown state: {}", s)))
    }
}
