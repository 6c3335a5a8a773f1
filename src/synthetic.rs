//! Seeded synthetic survey responses.
//!
//! Produces rows with the OSMI column layout and a treatment label drawn from
//! a fixed logistic model in which family history dominates. Empty strings
//! stand for unanswered questions. Used by the `survey-generator` tool and by
//! the test suite.

use crate::types::SurveyRecord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;

/// Column order of the OSMI survey CSV
pub const CSV_COLUMNS: &[&str] = &[
    "Timestamp",
    "Age",
    "Gender",
    "Country",
    "state",
    "self_employed",
    "family_history",
    "treatment",
    "work_interfere",
    "no_employees",
    "remote_work",
    "tech_company",
    "benefits",
    "care_options",
    "wellness_program",
    "seek_help",
    "anonymity",
    "leave",
    "mental_health_consequence",
    "phys_health_consequence",
    "coworkers",
    "supervisor",
    "mental_health_interview",
    "phys_health_interview",
    "mental_vs_physical",
    "obs_consequence",
    "comments",
];

/// One generated respondent
#[derive(Debug, Clone)]
pub struct SurveyRow {
    pub record: SurveyRecord,
    pub treatment: bool,
}

impl SurveyRow {
    /// Render as a CSV row in [`CSV_COLUMNS`] order, `NA` for missing answers
    pub fn to_csv_row(&self, index: u64) -> Vec<String> {
        CSV_COLUMNS
            .iter()
            .map(|&column| match column {
                "Timestamp" => format!("2014-08-27 {:02}:{:02}:00", index / 60 % 24, index % 60),
                "treatment" => (if self.treatment { "Yes" } else { "No" }).to_string(),
                "state" | "comments" => "NA".to_string(),
                _ => self.record.text(column).unwrap_or_else(|| "NA".to_string()),
            })
            .collect()
    }
}

/// Write rows as a survey CSV with a header line
pub fn write_csv<W: Write>(out: W, rows: &[SurveyRow]) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(CSV_COLUMNS)?;
    for (index, row) in rows.iter().enumerate() {
        writer.write_record(row.to_csv_row(index as u64))?;
    }
    writer.flush()?;
    Ok(())
}

/// Synthetic survey generator
pub struct SurveyGenerator {
    rng: StdRng,
}

impl SurveyGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn generate(&mut self, count: usize) -> Vec<SurveyRow> {
        (0..count).map(|_| self.next_row()).collect()
    }

    /// Generate one respondent and draw their treatment label
    pub fn next_row(&mut self) -> SurveyRow {
        let age: i64 = if self.rng.gen_bool(0.02) {
            *self.choice(&[-1, 5, 8, 329, 99999])
        } else {
            self.rng.gen_range(21..=60)
        };

        let gender = self.weighted(&[
            ("Male", 40),
            ("male", 10),
            ("M", 8),
            ("Cis Male", 3),
            ("Female", 15),
            ("female", 5),
            ("F", 4),
            ("Woman", 3),
            ("Trans woman", 2),
            ("non-binary", 2),
            ("queer/she/they", 2),
            ("", 6),
        ]);
        let country = self.weighted(&[
            ("United States", 50),
            ("United Kingdom", 12),
            ("Canada", 8),
            ("Germany", 6),
            ("Netherlands", 4),
            ("Ireland", 3),
            ("Australia", 3),
            ("France", 2),
            ("India", 2),
            ("New Zealand", 2),
            ("Sweden", 2),
            ("Poland", 2),
            ("Brazil", 2),
            ("Switzerland", 2),
        ]);

        let family_history = self.yes_no(0.4);
        let work_interfere = self.weighted(&[
            ("Never", 17),
            ("Rarely", 14),
            ("Sometimes", 37),
            ("Often", 11),
            ("", 21),
        ]);
        let benefits = self.weighted(&[("Yes", 38), ("No", 30), ("Don't know", 27), ("Not sure", 5)]);
        let care_options = self.weighted(&[("Yes", 35), ("No", 40), ("Not sure", 25)]);
        let obs_consequence = self.yes_no(0.15);

        let record = SurveyRecord::new()
            .with("Age", age)
            .with("Gender", gender)
            .with("Country", country)
            .with("family_history", family_history)
            .with("work_interfere", work_interfere)
            .with("benefits", benefits)
            .with("care_options", care_options)
            .with("obs_consequence", obs_consequence)
            .with(
                "self_employed",
                self.weighted(&[("No", 85), ("Yes", 12), ("", 3)]),
            )
            .with(
                "no_employees",
                self.weighted(&[
                    ("1-5", 13),
                    ("6-25", 23),
                    ("26-100", 23),
                    ("100-500", 14),
                    ("500-1000", 5),
                    ("More than 1000", 22),
                ]),
            )
            .with("remote_work", self.yes_no(0.3))
            .with("tech_company", self.yes_no(0.8))
            .with(
                "wellness_program",
                self.weighted(&[("No", 67), ("Yes", 18), ("Don't know", 15)]),
            )
            .with("seek_help", self.yes_no(0.2))
            .with("anonymity", self.yes_no(0.3))
            .with(
                "leave",
                self.weighted(&[
                    ("Very easy", 16),
                    ("Somewhat easy", 21),
                    ("Don't know", 45),
                    ("Somewhat difficult", 10),
                    ("Very difficult", 8),
                ]),
            )
            .with("mental_health_consequence", self.yes_no(0.4))
            .with("phys_health_consequence", self.yes_no(0.1))
            .with(
                "coworkers",
                self.weighted(&[("Some of them", 62), ("No", 21), ("Yes", 17)]),
            )
            .with("supervisor", self.yes_no(0.5))
            .with(
                "mental_health_interview",
                self.weighted(&[("No", 80), ("Maybe", 17), ("Yes", 3)]),
            )
            .with(
                "phys_health_interview",
                self.weighted(&[("Maybe", 44), ("No", 40), ("Yes", 16)]),
            )
            .with("mental_vs_physical", self.yes_no(0.3));

        let mut logit: f64 = -0.9;
        if family_history == "Yes" {
            logit += 2.4;
        }
        logit += match work_interfere {
            "Never" => -1.0,
            "Rarely" => 0.0,
            "Sometimes" => 0.6,
            "Often" => 1.0,
            _ => -0.5,
        };
        if benefits == "Yes" {
            logit += 0.5;
        }
        if care_options == "Yes" {
            logit += 0.4;
        }
        if obs_consequence == "Yes" {
            logit += 0.3;
        }
        if matches!(gender, "Female" | "female" | "F" | "Woman") {
            logit += 0.4;
        }

        let p = 1.0 / (1.0 + (-logit).exp());
        let treatment = self.rng.gen_bool(p);

        SurveyRow { record, treatment }
    }

    fn yes_no(&mut self, p_yes: f64) -> &'static str {
        if self.rng.gen_bool(p_yes) {
            "Yes"
        } else {
            "No"
        }
    }

    fn choice<'a, T>(&mut self, choices: &'a [T]) -> &'a T {
        &choices[self.rng.gen_range(0..choices.len())]
    }

    fn weighted(&mut self, choices: &[(&'static str, u32)]) -> &'static str {
        let total: u32 = choices.iter().map(|(_, w)| w).sum();
        let mut pick = self.rng.gen_range(0..total);
        for (value, weight) in choices {
            if pick < *weight {
                return *value;
            }
            pick -= weight;
        }
        choices[choices.len() - 1].0
    }
}
