use super::{UserId, VideoId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Highest accepted score
pub const MAX_SCORE: f64 = 5.0;

/// Rating score with one decimal digit, stored as tenths (0..=50)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Score(u8);

impl Score {
    /// Round to the nearest tenth; `None` when not finite or outside `0.0..=5.0`
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let tenths = (value * 10.0).round();
        if !(0.0..=MAX_SCORE * 10.0).contains(&tenths) {
            return None;
        }
        Some(Score(tenths as u8))
    }

    pub fn from_tenths(tenths: i16) -> Option<Self> {
        u8::try_from(tenths)
            .ok()
            .filter(|t| f64::from(*t) <= MAX_SCORE * 10.0)
            .map(Score)
    }

    pub fn tenths(&self) -> i16 {
        i16::from(self.0)
    }

    pub fn as_f64(&self) -> f64 {
        f64::from(self.0) / 10.0
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Score::from_f64(value)
            .ok_or_else(|| serde::de::Error::custom(format!("score out of range: {value}")))
    }
}

/// Arithmetic mean rounded to two decimals. Zero scores average to 0.0.
pub fn mean_score<I>(scores: I) -> f64
where
    I: IntoIterator<Item = Score>,
{
    let (sum, count) = scores
        .into_iter()
        .fold((0i64, 0i64), |(sum, count), s| (sum + i64::from(s.tenths()), count + 1));
    if count == 0 {
        return 0.0;
    }
    round_average(sum as f64 / count as f64 / 10.0)
}

/// Averages are persisted with two decimals
pub fn round_average(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub video_id: VideoId,
    pub score: Score,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_rounds_to_tenths() {
        assert_eq!(Score::from_f64(4.0).map(|s| s.tenths()), Some(40));
        assert_eq!(Score::from_f64(3.26).map(|s| s.tenths()), Some(33));
        assert_eq!(Score::from_f64(0.0).map(|s| s.tenths()), Some(0));
        assert_eq!(Score::from_f64(5.0).map(|s| s.tenths()), Some(50));
    }

    #[test]
    fn test_score_rejects_out_of_range() {
        assert!(Score::from_f64(-0.1).is_none());
        assert!(Score::from_f64(5.1).is_none());
        assert!(Score::from_f64(f64::NAN).is_none());
        assert!(Score::from_tenths(51).is_none());
        assert!(Score::from_tenths(-1).is_none());
    }

    #[test]
    fn test_mean_score() {
        let scores = [3.0, 4.0, 5.0].map(|v| Score::from_f64(v).unwrap());
        assert_eq!(mean_score(scores), 4.0);

        let scores = [3.0, 4.0, 5.0, 1.0].map(|v| Score::from_f64(v).unwrap());
        assert_eq!(mean_score(scores), 3.25);

        assert_eq!(mean_score(Vec::new()), 0.0);
    }

    #[test]
    fn test_mean_score_two_decimals() {
        let scores = [1.0, 1.0, 2.0].map(|v| Score::from_f64(v).unwrap());
        assert_eq!(mean_score(scores), 1.33);
    }

    #[test]
    fn test_score_deserializes_from_number() {
        let score: Score = serde_json::from_str("4.5").unwrap();
        assert_eq!(score.tenths(), 45);
        assert!(serde_json::from_str::<Score>("9").is_err());
    }
}
