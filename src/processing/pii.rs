//! Pattern-based PII detection and redaction.
//!
//! Detectors run in a fixed scan order over the *source* text. A span claimed by an earlier
//! detector, or an existing placeholder token, cannot be claimed again, which keeps replacement
//! deterministic and makes filtering idempotent. Detection is purely syntactic; false positives
//! on ID-shaped numbers are expected.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Range;

use crate::config::PiiConfig;

/// Category of sensitive data a detector looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    /// Email addresses.
    Email,
    /// Dotted-quad IPv4 addresses.
    IpAddress,
    /// 13–16 digit payment-card shaped numbers.
    PaymentCard,
    /// Social-security shaped numbers (`123-45-6789`).
    Ssn,
    /// North American phone numbers.
    Phone,
    /// Number + capitalized street name + street suffix.
    StreetAddress,
    /// US ZIP codes, five digits with an optional `-1234` extension.
    PostalCode,
    /// One capital letter followed by eight digits.
    Passport,
    /// One capital letter followed by seven digits.
    DriversLicense,
    /// Bare runs of 8 to 17 digits.
    BankAccount,
    /// Names following an honorific.
    PersonName,
}

impl PiiCategory {
    /// All categories in scan order.
    pub const SCAN_ORDER: [Self; 11] = [
        Self::Email,
        Self::IpAddress,
        Self::PaymentCard,
        Self::Ssn,
        Self::Phone,
        Self::StreetAddress,
        Self::PostalCode,
        Self::Passport,
        Self::DriversLicense,
        Self::BankAccount,
        Self::PersonName,
    ];

    /// Placeholder that replaces a match of this category.
    pub const fn placeholder(self) -> &'static str {
        match self {
            Self::Email => "[EMAIL_REDACTED]",
            Self::IpAddress => "[IP_REDACTED]",
            Self::PaymentCard => "[CARD_REDACTED]",
            Self::Ssn => "[SSN_REDACTED]",
            Self::Phone => "[PHONE_REDACTED]",
            Self::StreetAddress => "[ADDRESS_REDACTED]",
            Self::PostalCode => "[ZIP_REDACTED]",
            Self::Passport => "[PASSPORT_REDACTED]",
            Self::DriversLicense => "[LICENSE_REDACTED]",
            Self::BankAccount => "[ACCOUNT_REDACTED]",
            Self::PersonName => "[NAME_REDACTED]",
        }
    }

    const fn pattern(self) -> &'static str {
        match self {
            Self::Email => r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            Self::IpAddress => {
                r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b"
            }
            Self::PaymentCard => {
                r"\b(?:\d{4}[- ]?){3}\d{4}\b|\b3[47]\d{2}[- ]?\d{6}[- ]?\d{5}\b"
            }
            Self::Ssn => r"\b\d{3}[- ]?\d{2}[- ]?\d{4}\b",
            Self::Phone => r"(?:\+1[-. ]?)?(?:\(\d{3}\) ?|\b\d{3}[-. ]?)\d{3}[-. ]?\d{4}\b",
            Self::StreetAddress => {
                r"\b\d{1,6}[ \t]+(?:[A-Z][A-Za-z]*[ \t]+){1,4}(?:Street|St|Avenue|Ave|Road|Rd|Drive|Dr|Lane|Ln|Boulevard|Blvd|Court|Ct|Place|Pl|Way|Circle|Cir)\b\.?"
            }
            Self::PostalCode => r"\b\d{5}(?:-\d{4})?\b",
            Self::Passport => r"\b[A-Z]\d{8}\b",
            Self::DriversLicense => r"\b[A-Z]\d{7}\b",
            Self::BankAccount => r"\b\d{8,17}\b",
            Self::PersonName => {
                r"\b(?:Mr|Mrs|Ms|Mx|Dr|Prof)\.?[ \t]+(?P<pii>[A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+){0,2})"
            }
        }
    }
}

/// One redacted span. Offsets index the source text; the raw matched text is never retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PiiFinding {
    /// Category of the detector that claimed the span.
    pub category: PiiCategory,
    /// Byte range of the match in the source text.
    pub span: Range<usize>,
    /// Placeholder written in its place.
    pub replacement: &'static str,
}

/// Per-category redaction counts for one filtered text.
///
/// Counts reflect placeholders present in the redacted output, so filtering already-redacted
/// text reports the same statistics again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilteringStats {
    /// Email placeholders.
    pub email_count: usize,
    /// IP address placeholders.
    pub ip_count: usize,
    /// Payment card placeholders.
    pub card_count: usize,
    /// SSN placeholders.
    pub ssn_count: usize,
    /// Phone placeholders.
    pub phone_count: usize,
    /// Street address placeholders.
    pub address_count: usize,
    /// ZIP code placeholders.
    pub zip_count: usize,
    /// Passport number placeholders.
    pub passport_count: usize,
    /// Driver's license placeholders.
    pub license_count: usize,
    /// Bank account placeholders.
    pub account_count: usize,
    /// Person name placeholders.
    pub name_count: usize,
    /// Sum of all category counts.
    pub total_redactions: usize,
    /// Whether any category is non-zero.
    pub any_detected: bool,
}

impl FilteringStats {
    /// Count recorded for a category.
    pub fn count(&self, category: PiiCategory) -> usize {
        match category {
            PiiCategory::Email => self.email_count,
            PiiCategory::IpAddress => self.ip_count,
            PiiCategory::PaymentCard => self.card_count,
            PiiCategory::Ssn => self.ssn_count,
            PiiCategory::Phone => self.phone_count,
            PiiCategory::StreetAddress => self.address_count,
            PiiCategory::PostalCode => self.zip_count,
            PiiCategory::Passport => self.passport_count,
            PiiCategory::DriversLicense => self.license_count,
            PiiCategory::BankAccount => self.account_count,
            PiiCategory::PersonName => self.name_count,
        }
    }

    fn set(&mut self, category: PiiCategory, count: usize) {
        let slot = match category {
            PiiCategory::Email => &mut self.email_count,
            PiiCategory::IpAddress => &mut self.ip_count,
            PiiCategory::PaymentCard => &mut self.card_count,
            PiiCategory::Ssn => &mut self.ssn_count,
            PiiCategory::Phone => &mut self.phone_count,
            PiiCategory::StreetAddress => &mut self.address_count,
            PiiCategory::PostalCode => &mut self.zip_count,
            PiiCategory::Passport => &mut self.passport_count,
            PiiCategory::DriversLicense => &mut self.license_count,
            PiiCategory::BankAccount => &mut self.account_count,
            PiiCategory::PersonName => &mut self.name_count,
        };
        *slot = count;
    }

    fn tally(redacted: &str) -> Self {
        let mut stats = Self::default();
        for category in PiiCategory::SCAN_ORDER {
            let count = redacted.matches(category.placeholder()).count();
            stats.set(category, count);
            stats.total_redactions += count;
        }
        stats.any_detected = stats.total_redactions > 0;
        stats
    }
}

/// Redacted text paired with its statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilteredDocument {
    /// Source text with every detected span replaced by its placeholder.
    pub text: String,
    /// Per-category counts.
    pub stats: FilteringStats,
    /// Spans redacted by this pass, in source order.
    #[serde(skip)]
    pub findings: Vec<PiiFinding>,
}

#[derive(Debug, Clone)]
struct Detector {
    category: PiiCategory,
    pattern: Regex,
}

/// Ordered set of PII detectors built from a [`PiiConfig`].
#[derive(Debug, Clone)]
pub struct PiiFilter {
    detectors: Vec<Detector>,
    placeholders: Regex,
}

impl PiiFilter {
    /// Compile the detectors enabled by `config`.
    pub fn new(config: &PiiConfig) -> Self {
        let detectors = PiiCategory::SCAN_ORDER
            .into_iter()
            .filter(|category| match category {
                PiiCategory::StreetAddress => config.redact_addresses,
                PiiCategory::PostalCode => config.redact_postal_codes,
                PiiCategory::Passport
                | PiiCategory::DriversLicense
                | PiiCategory::BankAccount => config.redact_id_numbers,
                PiiCategory::PersonName => config.redact_names,
                _ => true,
            })
            .map(|category| Detector {
                category,
                pattern: compile(category.pattern()),
            })
            .collect();

        let tokens = PiiCategory::SCAN_ORDER
            .iter()
            .map(|category| regex::escape(category.placeholder()))
            .collect::<Vec<_>>()
            .join("|");

        Self {
            detectors,
            placeholders: compile(&tokens),
        }
    }

    /// Categories this filter scans for, in scan order.
    pub fn categories(&self) -> impl Iterator<Item = PiiCategory> + '_ {
        self.detectors.iter().map(|detector| detector.category)
    }

    /// Byte ranges of placeholder tokens already present in `text`.
    pub fn placeholder_spans<'a>(
        &'a self,
        text: &'a str,
    ) -> impl Iterator<Item = Range<usize>> + 'a {
        self.placeholders.find_iter(text).map(|found| found.range())
    }

    /// Redact every detected span in `text`.
    pub fn filter(&self, text: &str) -> FilteredDocument {
        let mut claims = Claims::default();
        for existing in self.placeholder_spans(text) {
            claims.try_claim(existing);
        }

        let mut findings = Vec::new();
        for detector in &self.detectors {
            for captures in detector.pattern.captures_iter(text) {
                let Some(found) = captures.name("pii").or_else(|| captures.get(0)) else {
                    continue;
                };
                if found.is_empty() || !claims.try_claim(found.range()) {
                    continue;
                }
                findings.push(PiiFinding {
                    category: detector.category,
                    span: found.range(),
                    replacement: detector.category.placeholder(),
                });
            }
        }
        findings.sort_by_key(|finding| finding.span.start);

        let mut redacted = String::with_capacity(text.len());
        let mut cursor = 0;
        for finding in &findings {
            redacted.push_str(&text[cursor..finding.span.start]);
            redacted.push_str(finding.replacement);
            cursor = finding.span.end;
        }
        redacted.push_str(&text[cursor..]);

        let stats = FilteringStats::tally(&redacted);
        FilteredDocument {
            text: redacted,
            stats,
            findings,
        }
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in PII pattern must compile")
}

/// Disjoint byte ranges already claimed, keyed by start offset.
#[derive(Default)]
struct Claims(BTreeMap<usize, usize>);

impl Claims {
    fn try_claim(&mut self, range: Range<usize>) -> bool {
        let overlaps = self
            .0
            .range(..range.end)
            .next_back()
            .is_some_and(|(_, &end)| end > range.start);
        if overlaps {
            return false;
        }
        self.0.insert(range.start, range.end);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> PiiFilter {
        PiiFilter::new(&PiiConfig::default())
    }

    #[test]
    fn every_email_occurrence_is_redacted_and_counted() {
        let corpus = [
            ("contact a@x.com today", 1),
            ("john.doe+news@mail.example.co.uk, JANE_D@Example.ORG", 2),
            ("first: x1@a.io\nsecond: x2@b.io\nthird: x3@c.io", 3),
        ];
        for (text, expected) in corpus {
            let filtered = filter().filter(text);
            assert_eq!(filtered.stats.email_count, expected, "{text}");
            assert!(!filtered.text.contains('@'), "{}", filtered.text);
            assert_eq!(
                filtered.text.matches("[EMAIL_REDACTED]").count(),
                expected
            );
        }
    }

    #[test]
    fn numeric_identifiers_get_their_own_placeholders() {
        let filtered = filter().filter(
            "SSN 123-45-6789, card 4111 1111 1111 1111, call (555) 123-4567 or +1-555-987-6543, host 192.168.1.20",
        );
        assert_eq!(
            filtered.text,
            "SSN [SSN_REDACTED], card [CARD_REDACTED], call [PHONE_REDACTED] or [PHONE_REDACTED], host [IP_REDACTED]"
        );
        assert_eq!(filtered.stats.ssn_count, 1);
        assert_eq!(filtered.stats.card_count, 1);
        assert_eq!(filtered.stats.phone_count, 2);
        assert_eq!(filtered.stats.ip_count, 1);
        assert_eq!(filtered.stats.total_redactions, 5);
        assert!(filtered.stats.any_detected);
    }

    #[test]
    fn clean_text_passes_through_untouched() {
        let text = "Revenue grew 12% in 2023 across 4 regions.";
        let filtered = filter().filter(text);
        assert_eq!(filtered.text, text);
        assert_eq!(filtered.stats, FilteringStats::default());
        assert!(!filtered.stats.any_detected);
        assert!(filtered.findings.is_empty());
    }

    #[test]
    fn filtering_is_idempotent() {
        let text = "Mail ops@corp.example or call 555-123-4567; office at 221 Baker Street.";
        let filter = filter();
        let once = filter.filter(text);
        let twice = filter.filter(&once.text);
        assert_eq!(twice.text, once.text);
        assert_eq!(twice.stats, once.stats);
        assert!(twice.findings.is_empty());
        assert_eq!(once.stats.address_count, 1);
    }

    #[test]
    fn earlier_detectors_win_overlapping_spans() {
        // The card number also contains SSN- and phone-shaped digit runs.
        let filtered = filter().filter("4111-1111-1111-1111");
        assert_eq!(filtered.text, "[CARD_REDACTED]");
        assert_eq!(filtered.findings.len(), 1);
        assert_eq!(filtered.findings[0].category, PiiCategory::PaymentCard);
        assert_eq!(filtered.findings[0].span, 0..19);
    }

    #[test]
    fn name_heuristic_is_opt_in_and_keeps_honorific() {
        let text = "Signed by Dr. Grace Hopper yesterday";
        assert_eq!(filter().filter(text).text, text);

        let names = PiiFilter::new(&PiiConfig {
            redact_names: true,
            ..PiiConfig::default()
        });
        let filtered = names.filter(text);
        assert_eq!(filtered.text, "Signed by Dr. [NAME_REDACTED] yesterday");
        assert_eq!(filtered.stats.name_count, 1);
    }

    #[test]
    fn address_heuristic_can_be_disabled() {
        let quiet = PiiFilter::new(&PiiConfig {
            redact_addresses: false,
            ..PiiConfig::default()
        });
        let text = "Ship to 42 Elm St. please";
        assert_eq!(quiet.filter(text).text, text);
        assert_eq!(
            filter().filter(text).text,
            "Ship to [ADDRESS_REDACTED] please"
        );
        assert!(!quiet.categories().any(|c| c == PiiCategory::StreetAddress));
    }

    #[test]
    fn output_is_deterministic_across_runs() {
        let text = "a@b.io 123-45-6789 a@b.io";
        let first = filter().filter(text);
        for _ in 0..5 {
            assert_eq!(filter().filter(text), first);
        }
    }

    #[test]
    fn id_number_family_is_opt_in() {
        let text = "Passport C12345678, license D1234567, account 000123456789, ZIP 90210";
        let default = filter().filter(text);
        assert_eq!(default.text, text);
        assert!(!default.stats.any_detected);

        let strict = PiiFilter::new(&PiiConfig {
            redact_postal_codes: true,
            redact_id_numbers: true,
            ..PiiConfig::default()
        });
        let filtered = strict.filter(text);
        assert_eq!(
            filtered.text,
            "Passport [PASSPORT_REDACTED], license [LICENSE_REDACTED], account [ACCOUNT_REDACTED], ZIP [ZIP_REDACTED]"
        );
        assert_eq!(filtered.stats.passport_count, 1);
        assert_eq!(filtered.stats.license_count, 1);
        assert_eq!(filtered.stats.account_count, 1);
        assert_eq!(filtered.stats.zip_count, 1);
        assert_eq!(filtered.stats.total_redactions, 4);
        let again = strict.filter(&filtered.text);
        assert_eq!(again.text, filtered.text);
        assert_eq!(again.stats, filtered.stats);
    }

    #[test]
    fn card_and_phone_digits_are_not_reclaimed_as_accounts() {
        let strict = PiiFilter::new(&PiiConfig {
            redact_id_numbers: true,
            ..PiiConfig::default()
        });
        let filtered = strict.filter("card 4111111111111111 or 5551234567");
        assert_eq!(filtered.text, "card [CARD_REDACTED] or [PHONE_REDACTED]");
        assert_eq!(filtered.stats.account_count, 0);
    }
}
