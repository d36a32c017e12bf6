//! Prompt sent to the generative model.

use chrono::{NaiveDate, Utc};

use crate::forecast::{FactorTrend, OutcomeProbabilities, TimelineCategory, KEY_FACTOR_COUNT};

/// Source of "today" for the prompt.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

fn quoted(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| format!("\"{}\"", v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the analysis prompt for `date`. Same date, same prompt.
pub fn build_prompt(date: NaiveDate) -> String {
    let categories: Vec<&str> = TimelineCategory::ALL.iter().map(|c| c.as_str()).collect();
    let trends: Vec<&str> = FactorTrend::ALL.iter().map(|t| t.as_str()).collect();
    let [ukraine_win, frozen_conflict, russia_win] = OutcomeProbabilities::FIELDS;

    format!(
        r#"Analyze the current geopolitical situation of the war in Ukraine as of {date}. Your analysis must be objective, data-driven, and based on the most recent and credible information available.

Your tasks are:
1. Categorize the conflict's likely end into exactly one of these timeline categories: {categories}.
2. Provide a single, concise sentence justifying your timeline choice.
3. Identify exactly {factor_count} key factors influencing the war's trajectory. Each factor has a short "title", a one-sentence "impact", and a "trend" that MUST be one of: {trends}.
4. Provide a percentage probability for each of three long-term outcomes. The values must be non-negative integers and the three values MUST sum to exactly 100.

Outcome definitions:
- "{ukraine_win}": Complete Ukrainian victory, defined as Russia collapsing politically or militarily, allowing Ukraine to restore its full 1991 borders.
- "{frozen_conflict}": A long-term cessation of active, large-scale hostilities without a formal peace treaty, with lines of control remaining relatively static and territorial disputes unresolved.
- "{russia_win}": Complete Russian victory, defined as the installation of a pro-Russian government in Kyiv, the downfall of the current Ukrainian state, the capture of Kyiv, or Russia legally keeping the territories it has taken.

Your response MUST be a single valid JSON object with exactly this structure. Do not include any other text, explanations, or markdown fences.
{{
  "timelineCategory": "{example_category}",
  "timelineJustification": "The conflict is expected to be protracted due to entrenched positions and the continuous flow of international military aid.",
  "keyFactors": [
    {{ "title": "International aid", "impact": "Sustained deliveries keep Ukrainian defences supplied.", "trend": "{example_trend}" }}
  ],
  "outcomeProbabilities": {{
    "{ukraine_win}": 30,
    "{frozen_conflict}": 55,
    "{russia_win}": 15
  }}
}}
The "keyFactors" array in your answer must contain exactly {factor_count} entries."#,
        date = date.format("%Y-%m-%d"),
        categories = quoted(&categories),
        trends = quoted(&trends),
        factor_count = KEY_FACTOR_COUNT,
        example_category = TimelineCategory::NotSoon.as_str(),
        example_trend = FactorTrend::PositiveForUkraine.as_str(),
    )
}
