//! Stage 1: per-product rating averages split by keyword presence.
//!
//! Every parsed review contributes its rating under the plain product key.
//! Reviews whose text mentions one of the keywords contribute it a second
//! time under the tagged key (`<productId>Contains`). Each key is then reduced
//! to the arithmetic mean of its ratings.
//!
//! ```text
//! {"asin":"B2","overall":"5.0","reviewText":"see the comments"}  ─▶ ("B2Contains", 5.0), ("B2", 5.0)
//! {"asin":"B2","overall":"1.0","reviewText":"broke in a week"}   ─▶ ("B2", 1.0)
//!
//! B2 ─▶ 3.0      B2Contains ─▶ 5.0
//! ```

use keydiff_stats::summation::RunningMean;

use crate::{
    record::{ParseRecordError, RawRecord, ReviewRecord},
    stage::Stage,
};

/// Suffix appended to the product id of a keyword-matching review.
pub const TAG_SUFFIX: &str = "Contains";

/// Keywords searched for in review text, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSet {
    lowercased: Vec<String>,
}

impl Default for KeywordSet {
    fn default() -> Self {
        Self::new(["reviews", "comments"])
    }
}

impl KeywordSet {
    /// Creates a keyword set. Empty keywords are ignored.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut lowercased = keywords
            .into_iter()
            .map(|keyword| keyword.as_ref().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect::<Vec<_>>();
        lowercased.sort();
        lowercased.dedup();
        Self { lowercased }
    }

    /// Lowercased keywords, sorted.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.lowercased.iter().map(String::as_str)
    }

    /// Returns `true` if `text` contains any keyword, ignoring case.
    ///
    /// Case folding uses Unicode lowercase mapping, which does not depend on
    /// the process locale.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        if self.lowercased.is_empty() {
            return false;
        }
        let text = text.to_lowercase();
        self.lowercased
            .iter()
            .any(|keyword| text.contains(keyword.as_str()))
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("no ratings were delivered")]
pub struct EmptyGroupError;

/// Parses reviews, tags keyword matches and averages ratings per key.
#[derive(Debug, Clone, Default)]
pub struct AverageStage {
    keywords: KeywordSet,
}

impl AverageStage {
    pub const NAME: &'static str = "average";

    #[must_use]
    pub fn new(keywords: KeywordSet) -> Self {
        Self { keywords }
    }

    /// The keyed observations of one parsed review.
    #[must_use]
    pub fn observations(&self, review: &ReviewRecord) -> Vec<(String, f64)> {
        let mut observations = Vec::with_capacity(2);
        if self.keywords.matches(&review.review_text) {
            observations.push((format!("{}{TAG_SUFFIX}", review.product_id), review.rating));
        }
        observations.push((review.product_id.clone(), review.rating));
        observations
    }
}

impl Stage for AverageStage {
    type Input = RawRecord;
    type Key = String;
    type Value = f64;
    type Output = f64;
    type MapError = ParseRecordError;
    type ReduceError = EmptyGroupError;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn map(&self, input: &RawRecord) -> Result<Vec<(String, f64)>, ParseRecordError> {
        let review = ReviewRecord::parse(input)?;
        Ok(self.observations(&review))
    }

    fn reduce(&self, _key: &String, values: Vec<f64>) -> Result<f64, EmptyGroupError> {
        values
            .into_iter()
            .collect::<RunningMean>()
            .mean()
            .ok_or(EmptyGroupError)
    }
}
