//! Metadata carried in WorldPop age/sex structure filenames.
//!
//! Source rasters are named `{iso3}_{gender}_{age}_{year}.tif`, for example
//! `nga_f_15_2020.tif` holds the female population aged 15-19 in Nigeria for
//! 2020. The age token names the lower bound of a five-year bracket, except
//! for the first two brackets (`0` = under one, `1` = one to four) and the
//! open-ended `80` bracket.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PopError, PopResult};

/// Lower bounds of every age bracket WorldPop publishes.
pub const AGE_BRACKETS: [u32; 18] = [
    0, 1, 5, 10, 15, 20, 25, 30, 35, 40, 45, 50, 55, 60, 65, 70, 75, 80,
];

/// Sex of the population counted in a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "f")]
    Female,
    #[serde(rename = "m")]
    Male,
}

impl Gender {
    /// Parse the single-letter filename token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "f" | "F" => Some(Self::Female),
            "m" | "M" => Some(Self::Male),
            _ => None,
        }
    }

    /// Single-letter code used in filenames and the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Female => "f",
            Self::Male => "m",
        }
    }

    pub fn all() -> [Gender; 2] {
        [Self::Female, Self::Male]
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An age range identified by its lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgeBracket {
    lower: u32,
}

impl AgeBracket {
    /// Bracket starting at `lower` years.
    pub fn new(lower: u32) -> Self {
        Self { lower }
    }

    /// Parse the numeric age token of a filename.
    pub fn from_token(token: &str) -> PopResult<Self> {
        token
            .parse::<u32>()
            .map(Self::new)
            .map_err(|_| PopError::invalid_parameter("age", format!("not a number: {}", token)))
    }

    /// Lower bound in years, inclusive.
    pub fn lower(&self) -> u32 {
        self.lower
    }

    /// Upper bound in years, or `None` for the open-ended 80+ bracket.
    ///
    /// The under-one bracket is `[0, 1)` and stores 1; the one-to-four
    /// bracket is `[1, 4]`; every other bracket `N` spans `[N, N + 4]`.
    pub fn upper(&self) -> Option<u32> {
        match self.lower {
            0 => Some(1),
            1 => Some(4),
            80 => None,
            n => Some(n + 4),
        }
    }
}

impl std::fmt::Display for AgeBracket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.lower, self.upper()) {
            (0, _) => write!(f, "[0, 1)"),
            (lower, Some(upper)) => write!(f, "[{}, {}]", lower, upper),
            (lower, None) => write!(f, "[{}, open)", lower),
        }
    }
}

/// Everything a WorldPop raster filename encodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterFileInfo {
    /// ISO 3166-1 alpha-3 country code, lowercase.
    pub iso3: String,
    pub gender: Gender,
    pub age: AgeBracket,
    pub year: u32,
    /// Basename the metadata was parsed from.
    pub file_name: String,
}

impl RasterFileInfo {
    /// Parse metadata from a path or basename.
    ///
    /// Looks for the last `{aaa}_{m|f}_{d or dd}_{dddd}` run of tokens in
    /// the basename, which must be a `.tif`/`.tiff` file. Anything before the
    /// country code or after the year is ignored.
    pub fn parse(path: &str) -> PopResult<Self> {
        let file_name = Path::new(path)
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| PopError::InvalidFilename(path.to_string()))?;

        let lower = file_name.to_lowercase();
        let stem = lower
            .strip_suffix(".tif")
            .or_else(|| lower.strip_suffix(".tiff"))
            .ok_or_else(|| PopError::InvalidFilename(file_name.to_string()))?;

        let tokens: Vec<&str> = stem.split('_').collect();
        if tokens.len() < 4 {
            return Err(PopError::InvalidFilename(file_name.to_string()));
        }

        // Scan right to left so the last matching run wins
        for start in (0..=tokens.len() - 4).rev() {
            let window = &tokens[start..start + 4];
            let Some(iso3) = country_suffix(window[0]) else {
                continue;
            };
            let Some(gender) = Gender::from_token(window[1]) else {
                continue;
            };
            if !is_digits(window[2], 1, 2) {
                continue;
            }
            let Some(year) = year_prefix(window[3]) else {
                continue;
            };

            return Ok(Self {
                iso3: iso3.to_string(),
                gender,
                age: AgeBracket::from_token(window[2])?,
                year,
                file_name: file_name.to_string(),
            });
        }

        Err(PopError::InvalidFilename(file_name.to_string()))
    }

    /// Object-store key: `{year}/{iso3}/{basename}`.
    pub fn storage_key(&self) -> String {
        format!("{}/{}", storage_prefix(&self.iso3, self.year), self.file_name)
    }
}

/// Object-store prefix holding every raster of one country and year.
pub fn storage_prefix(iso3: &str, year: u32) -> String {
    format!("{}/{}", year, iso3.to_lowercase())
}

/// Every source filename WorldPop publishes for a country and year.
pub fn source_filenames(iso3: &str, year: u32) -> Vec<String> {
    let iso3 = iso3.to_lowercase();
    let mut names = Vec::with_capacity(Gender::all().len() * AGE_BRACKETS.len());
    for gender in Gender::all() {
        for age in AGE_BRACKETS {
            names.push(format!("{}_{}_{}_{}.tif", iso3, gender, age, year));
        }
    }
    names
}

/// Validate an ISO 3166-1 alpha-3 code (three ASCII letters, any case).
pub fn is_valid_iso3(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())
}

/// Last three characters of a token when they are lowercase ASCII letters.
fn country_suffix(token: &str) -> Option<&str> {
    let suffix = token.get(token.len().checked_sub(3)?..)?;
    suffix
        .chars()
        .all(|c| c.is_ascii_lowercase())
        .then_some(suffix)
}

/// Leading four digits of a token.
fn year_prefix(token: &str) -> Option<u32> {
    let prefix = token.get(..4)?;
    if !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

fn is_digits(token: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&token.len()) && token.chars().all(|c| c.is_ascii_digit())
}
