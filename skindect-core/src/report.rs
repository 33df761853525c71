use crate::model::CLASS_NAMES;
use serde_json::{Map, Value};
use unicode_width::UnicodeWidthStr;

/// One label with its probability, as a display percentage.
#[derive(Debug, Clone)]
pub struct RankedClass {
    pub label: &'static str,
    probability: f32,
    pub percent: f64,
}

/// A probability vector paired with labels and sorted descending.
/// Ties keep training label order (stable sort).
#[derive(Debug, Clone)]
pub struct Ranking {
    entries: Vec<RankedClass>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl Ranking {
    /// # Panics
    ///
    /// Panics unless `probabilities` holds exactly one value per label in
    /// [`CLASS_NAMES`]. Shorter or longer vectors would silently drop or
    /// invent classes.
    pub fn new(probabilities: &[f32]) -> Self {
        assert_eq!(
            probabilities.len(),
            CLASS_NAMES.len(),
            "expected one probability per class"
        );
        let mut entries = CLASS_NAMES
            .iter()
            .zip(probabilities)
            .map(|(label, &probability)| RankedClass {
                label,
                probability,
                percent: round2(probability as f64 * 100.0),
            })
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        Self { entries }
    }

    /// Entries in descending confidence order.
    pub fn entries(&self) -> &[RankedClass] {
        &self.entries
    }

    /// The top-1 label.
    pub fn predicted_class(&self) -> &'static str {
        self.entries[0].label
    }

    /// Top-1 probability as a percentage rounded to 2 decimals.
    pub fn confidence(&self) -> f64 {
        self.entries[0].percent
    }

    /// Ordered label -> percent object for the JSON response, descending.
    pub fn to_json_map(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|entry| (entry.label.to_owned(), Value::from(entry.percent)))
            .collect()
    }

    /// Console report: detected class, confidence, then one bar per class.
    pub fn print_report(&self) {
        let rule = "=".repeat(70);
        println!("{rule}");
        println!("PREDICTION RESULTS");
        println!("{rule}");
        println!();
        println!("Detected class: {}", self.predicted_class());
        println!("Confidence: {:.2}%", self.confidence());
        println!();
        println!("All class probabilities:");
        println!("{}", "-".repeat(70));
        let width = CLASS_NAMES.iter().map(|l| l.width()).max().unwrap_or(0);
        for (rank, entry) in self.entries.iter().enumerate() {
            let pad = " ".repeat(width - entry.label.width());
            let bar = "█".repeat((entry.percent / 2.0) as usize);
            println!(
                "{rank:>2}. {label}{pad}  {bar:<50}  {percent:6.2}%",
                rank = rank + 1,
                label = entry.label,
                percent = entry.percent,
            );
        }
        println!("{rule}");
    }
}
