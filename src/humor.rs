//! Keyword-driven quips for weather descriptions.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;

/// Adds humor to arbitrary text (language-model path).
///
/// Implementations never fail: problems are reported inside the returned
/// text, since it goes straight to the user.
#[async_trait]
pub trait Humorist: Send + Sync {
    async fn add_humor(&self, text: &str) -> String;
}

const RAIN_QUIPS: &[&str] = &[
    "Looks like it's raining cats and dogs out there!",
    "Don't forget your umbrella, unless you want to look like a drowned rat!",
    "Rain, rain, go away! Come again another day when I don't have plans.",
];

const SUNNY_QUIPS: &[&str] = &[
    "Time to break out the sunscreen and shades!",
    "It's a beautiful day to be outside and work on your tan lines!",
    "Careful, the sun is out and ready to turn you into a human crisp!",
];

const CLOUDS_QUIPS: &[&str] = &[
    "Looks like the clouds are having a party in the sky today.",
    "Don't let the clouds rain on your parade, there's always a silver lining!",
    "Cloudy with a chance of sarcasm and witty remarks!",
];

const GENERIC_QUIPS: &[&str] = &[
    "The weather is as unpredictable as my sense of humor!",
    "I'm not sure what to make of this weather, but at least it's not boring!",
    "Weather forecast: a high chance of puns and dad jokes!",
];

/// Quip pool selected by keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumorPool {
    Rain,
    Sunny,
    Clouds,
    Generic,
}

impl HumorPool {
    /// Keyword groups in match priority order.
    const KEYWORDS: [(&'static str, HumorPool); 3] = [
        ("rain", HumorPool::Rain),
        ("sunny", HumorPool::Sunny),
        ("clouds", HumorPool::Clouds),
    ];

    /// First keyword contained in the (lowercased) description wins.
    pub fn classify(description: &str) -> Self {
        let description = description.to_lowercase();
        Self::KEYWORDS
            .iter()
            .find(|(keyword, _)| description.contains(keyword))
            .map(|(_, pool)| *pool)
            .unwrap_or(HumorPool::Generic)
    }

    pub fn quips(self) -> &'static [&'static str] {
        match self {
            HumorPool::Rain => RAIN_QUIPS,
            HumorPool::Sunny => SUNNY_QUIPS,
            HumorPool::Clouds => CLOUDS_QUIPS,
            HumorPool::Generic => GENERIC_QUIPS,
        }
    }
}

/// Pick a quip for `description` using the given random source.
pub fn pick_quip<R: Rng + ?Sized>(description: &str, rng: &mut R) -> &'static str {
    let pool = HumorPool::classify(description).quips();
    // Pools are non-empty constants.
    pool.choose(rng).copied().unwrap_or(GENERIC_QUIPS[0])
}
