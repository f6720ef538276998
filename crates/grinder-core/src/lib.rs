//! Row model, field converters, and per-variant normalization profiles.
//!
//! Everything here is synchronous and store-agnostic: a [`SourceRecord`] comes
//! out of the CSV layer, gets normalized into a typed row, and the row carries
//! its own natural key and required-field rules. The conversion semantics are
//! deliberately lenient (leading-prefix numeric parsing, silent rejection of
//! malformed dates) because the upstream reports are hand-maintained
//! spreadsheets, not machine output.

use std::collections::HashMap;

use serde::Serialize;

pub const CRATE_NAME: &str = "grinder-core";

/// One CSV data line, keyed by trimmed column name. Values are kept raw;
/// all cleanup happens in the converters.
#[derive(Debug, Clone, Default)]
pub struct SourceRecord {
    fields: HashMap<String, String>,
}

impl SourceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, header: &str, value: &str) {
        self.fields.insert(header.trim().to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SourceRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (header, value) in iter {
            let header = header.into();
            let value = value.into();
            record.insert(&header, &value);
        }
        record
    }
}

/// What a missing source column collapses to for an integer field.
///
/// The two tournament variants disagree on this (missing `Shots` is 0 in the
/// scheduled import, absent in the file import), so the policy is declared
/// per field in a [`TournamentProfile`] instead of assumed globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsencePolicy {
    Absent,
    Zero,
}

/// Parse the leading integer prefix of a trimmed string.
///
/// Unparseable input yields `None`, never 0: an absent count is not the same
/// thing as a count of zero. Asymmetric with [`parse_decimal_prefix`] on
/// purpose.
pub fn parse_int_prefix(raw: &str) -> Option<i32> {
    let s = raw.trim();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .as_bytes()
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    let value = if negative { -magnitude } else { magnitude };
    i32::try_from(value).ok()
}

/// Parse the leading float prefix of a trimmed string.
///
/// Unparseable input yields 0.0, never absent. Decimal fields in the reports
/// are amounts where 0 is the established failure sentinel.
pub fn parse_decimal_prefix(raw: &str) -> f64 {
    let s = raw.trim();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let mut seen_digit = false;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return 0.0;
    }
    s[..end].parse().unwrap_or(0.0)
}

/// [`parse_decimal_prefix`] after discarding every character that is not a
/// digit, sign, or decimal point. Handles currency-formatted values like
/// `"R$ 1.234,56"`. Total failure still yields 0.0.
pub fn parse_decimal_lenient(raw: &str) -> f64 {
    let stripped: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    parse_decimal_prefix(&stripped)
}

/// Convert a slash-delimited `dd/mm/yyyy` value (possibly quote-wrapped) into
/// `yyyy-mm-dd`, zero-padding day and month to width 2.
///
/// Any missing segment rejects the whole value as absent. No range checking
/// happens here; the store's date column is the authority on validity.
pub fn convert_date(raw: &str) -> Option<String> {
    let cleaned = raw.replace('"', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    let mut parts = cleaned.split('/');
    let day = parts.next().unwrap_or("");
    let month = parts.next().unwrap_or("");
    let year = parts.next().unwrap_or("");
    if day.is_empty() || month.is_empty() || year.is_empty() {
        return None;
    }
    Some(format!("{year}-{month:0>2}-{day:0>2}"))
}

/// Strip quote characters and surrounding whitespace; an empty remainder is
/// absent, not an empty string.
pub fn clean_text(raw: &str) -> Option<String> {
    let cleaned = raw.replace('"', "");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Empty string collapses to absent; everything else is kept verbatim.
pub fn non_empty(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

/// A row that knows its own natural key.
pub trait KeyedRow {
    /// Stable key string used for intra-run duplicate tracking.
    fn natural_key(&self) -> String;

    /// Human-readable identification for log lines and rejection reasons.
    fn describe(&self) -> String;
}

fn display_or_dash(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

/// Per-variant normalization and validation knobs for the tournament pipeline.
#[derive(Debug, Clone, Copy)]
pub struct TournamentProfile {
    /// What a missing `Shots` column collapses to.
    pub missing_shots: AbsencePolicy,
    /// Whether validation requires `shots` to be present.
    pub require_shots: bool,
    /// Legacy strict mode: treat a profit of exactly 0 as a missing field.
    /// Off by default; a zero-profit tournament is a real result.
    pub zero_profit_is_missing: bool,
}

impl TournamentProfile {
    /// Profile used by the scheduled (download + today-filter) import.
    pub fn scheduled() -> Self {
        Self {
            missing_shots: AbsencePolicy::Zero,
            require_shots: false,
            zero_profit_is_missing: false,
        }
    }

    /// Profile used when importing an already-downloaded file.
    pub fn offline() -> Self {
        Self {
            missing_shots: AbsencePolicy::Absent,
            require_shots: true,
            zero_profit_is_missing: false,
        }
    }
}

/// One normalized tournament result. Natural key: `(tournament_id, player)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TournamentRow {
    pub report_date: Option<String>,
    pub century: Option<String>,
    pub player: Option<String>,
    pub network: Option<String>,
    pub name: Option<String>,
    pub currency: Option<String>,
    pub buy_in: f64,
    pub profit: f64,
    pub shots: Option<i32>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub total_entrants: Option<i32>,
    pub tournament_id: Option<String>,
    pub stake: Option<String>,
    pub game: Option<String>,
    pub structure: Option<String>,
    pub flags: Option<String>,
    pub rake: f64,
    pub position: Option<i32>,
    pub speed: Option<String>,
}

impl TournamentRow {
    pub fn from_record(record: &SourceRecord, profile: &TournamentProfile) -> Self {
        let text = |name: &str| record.get(name).and_then(non_empty);
        Self {
            report_date: record.get("Data Relatório").and_then(convert_date),
            // Century is carried verbatim, empty string included.
            century: record.get("Century").map(str::to_string),
            player: text("Player"),
            network: text("Network"),
            name: text("Name"),
            currency: text("Currency"),
            buy_in: record.get("Buy in").map(parse_decimal_prefix).unwrap_or(0.0),
            profit: record.get("Profit").map(parse_decimal_prefix).unwrap_or(0.0),
            shots: match record.get("Shots").filter(|v| !v.is_empty()) {
                Some(raw) => parse_int_prefix(raw),
                None => match profile.missing_shots {
                    AbsencePolicy::Zero => Some(0),
                    AbsencePolicy::Absent => None,
                },
            },
            date: record.get("Date").and_then(clean_text),
            time: record.get("Time").and_then(clean_text),
            total_entrants: record.get("Total Entrants").and_then(parse_int_prefix),
            tournament_id: text("Tournament ID"),
            stake: text("Stake"),
            game: text("Game"),
            structure: text("Structure"),
            flags: text("Flags"),
            rake: record.get("Rake").map(parse_decimal_prefix).unwrap_or(0.0),
            position: record.get("Position").and_then(parse_int_prefix),
            speed: text("Speed"),
        }
    }

    /// Names of required fields this row is missing, per the given profile.
    /// Empty means the row is eligible for insertion.
    pub fn missing_fields(&self, profile: &TournamentProfile) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.report_date.is_none() {
            missing.push("report_date");
        }
        if profile.zero_profit_is_missing && self.profit == 0.0 {
            missing.push("profit");
        }
        if self.date.is_none() {
            missing.push("date");
        }
        if self.time.is_none() {
            missing.push("time");
        }
        if profile.require_shots && self.shots.is_none() {
            missing.push("shots");
        }
        missing
    }
}

impl KeyedRow for TournamentRow {
    fn natural_key(&self) -> String {
        format!(
            "{}\u{1f}{}",
            self.tournament_id.as_deref().unwrap_or(""),
            self.player.as_deref().unwrap_or("")
        )
    }

    fn describe(&self) -> String {
        format!(
            "tournament_id {}, player {}",
            display_or_dash(&self.tournament_id),
            display_or_dash(&self.player)
        )
    }
}

/// One normalized sharkbot stats line.
/// Natural key: `(nickname, search_date, bot_date)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharkbotRow {
    pub search_date: Option<String>,
    pub nickname: Option<String>,
    pub tournaments_count: Option<i32>,
    pub average_stack: f64,
    pub profit: f64,
    /// Raw trimmed value; may carry a time-of-day suffix after the date.
    pub bot_date: Option<String>,
}

impl SharkbotRow {
    pub fn from_record(record: &SourceRecord) -> Self {
        Self {
            search_date: record.get("Data Pesquisa").and_then(convert_date),
            nickname: record.get("Nick").and_then(non_empty),
            tournaments_count: record.get("Qtd Torneios").and_then(parse_int_prefix),
            average_stack: record
                .get("Stack Medio")
                .map(parse_decimal_lenient)
                .unwrap_or(0.0),
            profit: record.get("Lucro").map(parse_decimal_lenient).unwrap_or(0.0),
            bot_date: record
                .get("Data BOT")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }

    /// The sharkbot pipeline attempts every normalized row.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

impl KeyedRow for SharkbotRow {
    fn natural_key(&self) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{}",
            self.nickname.as_deref().unwrap_or(""),
            self.search_date.as_deref().unwrap_or(""),
            self.bot_date.as_deref().unwrap_or("")
        )
    }

    fn describe(&self) -> String {
        format!(
            "{} | {} | {}",
            display_or_dash(&self.nickname),
            display_or_dash(&self.search_date),
            display_or_dash(&self.bot_date)
        )
    }
}

/// A row skipped before insertion, with the reason it was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRow {
    pub key: String,
    pub reason: String,
}

/// A row whose insert was attempted and failed at the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedRow {
    pub key: String,
    pub error: String,
}

/// Per-run outcome accounting. Recoverable skips are recorded here and the
/// run keeps going; nothing in this struct ever aborts processing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Rows that survived the date filter and entered row processing.
    pub matched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: Vec<RejectedRow>,
    pub failed: Vec<FailedRow>,
}

impl RunReport {
    pub fn record_inserted(&mut self) {
        self.inserted += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.duplicates += 1;
    }

    pub fn record_rejected(&mut self, key: String, reason: String) {
        self.rejected.push(RejectedRow { key, reason });
    }

    pub fn record_failed(&mut self, key: String, error: String) {
        self.failed.push(FailedRow { key, error });
    }

    pub fn summary(&self) -> String {
        format!(
            "{} inserted, {} duplicate, {} rejected, {} failed ({} matched)",
            self.inserted,
            self.duplicates,
            self.rejected.len(),
            self.failed.len(),
            self.matched
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_with_missing_segment_is_absent() {
        assert_eq!(convert_date(""), None);
        assert_eq!(convert_date("12/2024"), None);
        assert_eq!(convert_date("/06/2024"), None);
        assert_eq!(convert_date("05//2024"), None);
        assert_eq!(convert_date("05/06/"), None);
        assert_eq!(convert_date("\"\""), None);
    }

    #[test]
    fn single_digit_day_and_month_are_zero_padded() {
        let converted = convert_date("3/7/2024").expect("valid date");
        assert_eq!(converted, "2024-07-03");
        assert_eq!(converted.len(), 10);
    }

    #[test]
    fn quoted_date_is_unwrapped() {
        assert_eq!(convert_date("\"05/06/2024\""), Some("2024-06-05".into()));
    }

    #[test]
    fn extra_date_segments_are_ignored() {
        assert_eq!(convert_date("1/2/2024/junk"), Some("2024-02-01".into()));
    }

    #[test]
    fn int_parsing_yields_absent_on_garbage() {
        assert_eq!(parse_int_prefix("abc"), None);
        assert_eq!(parse_int_prefix(""), None);
        assert_eq!(parse_int_prefix("-"), None);
        assert_eq!(parse_int_prefix("12 players"), Some(12));
        assert_eq!(parse_int_prefix(" 42 "), Some(42));
        assert_eq!(parse_int_prefix("-7"), Some(-7));
        assert_eq!(parse_int_prefix("3.9"), Some(3));
    }

    #[test]
    fn decimal_parsing_yields_zero_on_garbage() {
        assert_eq!(parse_decimal_prefix("xyz"), 0.0);
        assert_eq!(parse_decimal_prefix(""), 0.0);
        assert_eq!(parse_decimal_prefix("12.5-rebuy"), 12.5);
        assert_eq!(parse_decimal_prefix("-3.25"), -3.25);
        assert_eq!(parse_decimal_prefix(".5"), 0.5);
        assert_eq!(parse_decimal_prefix("12.34.56"), 12.34);
    }

    #[test]
    fn lenient_decimal_strips_currency_noise() {
        assert_eq!(parse_decimal_lenient("R$ 1.234,56-ish"), 1.23456);
        assert_eq!(parse_decimal_lenient("n/a"), 0.0);
        assert_eq!(parse_decimal_lenient("  1500  "), 1500.0);
    }

    #[test]
    fn clean_text_collapses_empty_to_absent() {
        assert_eq!(clean_text("\" hero123 \""), Some("hero123".into()));
        assert_eq!(clean_text(""), None);
        assert_eq!(clean_text("\"\""), None);
        assert_eq!(clean_text("   "), None);
    }

    fn tournament_record() -> SourceRecord {
        SourceRecord::from_iter([
            ("Data Relatório", "\"05/06/2025\""),
            ("Century", ""),
            ("Player", "hero123"),
            ("Network", "GG"),
            ("Name", "Daily Special"),
            ("Currency", "USD"),
            ("Buy in", "$109"),
            ("Profit", "542.10"),
            ("Shots", ""),
            ("Date", "\"05/06/2025\""),
            ("Time", "18:45"),
            ("Total Entrants", "1204"),
            ("Tournament ID", "T-9912"),
            ("Stake", "109"),
            ("Game", "NLH"),
            ("Structure", "Freezeout"),
            ("Flags", ""),
            ("Rake", "9"),
            ("Position", "17th"),
            ("Speed", "Turbo"),
        ])
    }

    #[test]
    fn scheduled_profile_defaults_missing_shots_to_zero() {
        let row = TournamentRow::from_record(&tournament_record(), &TournamentProfile::scheduled());
        assert_eq!(row.shots, Some(0));
        assert_eq!(row.report_date.as_deref(), Some("2025-06-05"));
        assert_eq!(row.profit, 542.10);
        assert_eq!(row.position, Some(17));
        assert_eq!(row.century.as_deref(), Some(""));
        assert_eq!(row.flags, None);
        assert!(row.missing_fields(&TournamentProfile::scheduled()).is_empty());
    }

    #[test]
    fn offline_profile_leaves_missing_shots_absent_and_requires_them() {
        let profile = TournamentProfile::offline();
        let row = TournamentRow::from_record(&tournament_record(), &profile);
        assert_eq!(row.shots, None);
        assert_eq!(row.missing_fields(&profile), vec!["shots"]);
    }

    #[test]
    fn unparseable_shots_are_absent_not_zero() {
        let mut record = tournament_record();
        record.insert("Shots", "unknown");
        let row = TournamentRow::from_record(&record, &TournamentProfile::scheduled());
        assert_eq!(row.shots, None);
    }

    #[test]
    fn missing_time_is_named_in_validation() {
        let mut record = tournament_record();
        record.insert("Time", "");
        let profile = TournamentProfile::scheduled();
        let row = TournamentRow::from_record(&record, &profile);
        assert_eq!(row.missing_fields(&profile), vec!["time"]);
    }

    #[test]
    fn zero_profit_is_valid_unless_legacy_strict_mode() {
        let mut record = tournament_record();
        record.insert("Profit", "bubble");
        let mut profile = TournamentProfile::scheduled();
        let row = TournamentRow::from_record(&record, &profile);
        assert_eq!(row.profit, 0.0);
        assert!(row.missing_fields(&profile).is_empty());

        profile.zero_profit_is_missing = true;
        assert_eq!(row.missing_fields(&profile), vec!["profit"]);
    }

    #[test]
    fn sharkbot_row_normalizes_currency_and_dates() {
        let record = SourceRecord::from_iter([
            ("Data Pesquisa", "5/6/2025"),
            ("Nick", "shark_hunter"),
            ("Qtd Torneios", "312"),
            ("Stack Medio", "R$ 45.230,10"),
            ("Lucro", "R$ -1.200,00"),
            ("Data BOT", " 05/06/2025 18:45 "),
        ]);
        let row = SharkbotRow::from_record(&record);
        assert_eq!(row.search_date.as_deref(), Some("2025-06-05"));
        assert_eq!(row.tournaments_count, Some(312));
        assert_eq!(row.average_stack, 45.23010);
        assert_eq!(row.profit, -1.20000);
        assert_eq!(row.bot_date.as_deref(), Some("05/06/2025 18:45"));
        assert!(row.missing_fields().is_empty());
    }

    #[test]
    fn natural_keys_distinguish_rows() {
        let a = SharkbotRow::from_record(&SourceRecord::from_iter([
            ("Nick", "alpha"),
            ("Data BOT", "05/06/2025"),
        ]));
        let b = SharkbotRow::from_record(&SourceRecord::from_iter([
            ("Nick", "alpha"),
            ("Data BOT", "06/06/2025"),
        ]));
        assert_ne!(a.natural_key(), b.natural_key());
        assert_eq!(a.natural_key(), a.clone().natural_key());
    }

    #[test]
    fn run_report_summary_counts_outcomes() {
        let mut report = RunReport {
            matched: 3,
            ..Default::default()
        };
        report.record_inserted();
        report.record_rejected("tournament_id T-1, player hero".into(), "missing fields: time".into());
        report.record_duplicate();
        assert_eq!(report.summary(), "1 inserted, 1 duplicate, 1 rejected, 0 failed (3 matched)");
    }
}
