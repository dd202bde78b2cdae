//! Plain-language rewriting of legal jargon.
//!
//! A fixed glossary maps legal terms and stock phrases ("pursuant to",
//! "indemnify and hold harmless", "force majeure") to everyday words. Terms
//! match as whole words, case-insensitively, across line breaks, and the
//! replacement takes the case of the matched text. Longer entries win over
//! the shorter ones they contain. No generation service is involved, so the
//! result is deterministic.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashMap;

/// Legal term → plain-language replacement. Terms are lowercase, single-spaced.
const GLOSSARY: &[(&str, &str)] = &[
    // Archaic connectives
    ("hereinafter", "from now on"),
    ("hereafter", "from now on"),
    ("aforementioned", "mentioned earlier"),
    ("aforesaid", "already mentioned"),
    ("pursuant to", "according to"),
    ("notwithstanding", "even though"),
    ("hereby", "by this"),
    ("therein", "in that"),
    ("forthwith", "right away"),
    ("whereas", "because"),
    ("shall", "will"),
    ("null and void", "not valid"),
    ("without prejudice", "without losing rights"),
    ("in witness whereof", "as proof"),
    ("witnesseth", "shows"),
    ("in perpetuity", "forever"),
    ("heretofore", "before now"),
    ("hereto", "to this"),
    ("herewith", "with this"),
    ("herein", "in here"),
    ("hereunder", "below"),
    ("hereunto", "to this"),
    ("thereunto", "to that"),
    ("thereby", "by that"),
    ("thereafter", "after that"),
    ("thereof", "of that"),
    ("thereto", "to that"),
    ("whatsoever", "at all"),
    ("whomsoever", "anyone"),
    ("whosoever", "whoever"),
    ("wherein", "where"),
    ("whereof", "of which"),
    ("whereby", "by which"),
    // Latin and abbreviations
    ("prima facie", "at first look"),
    ("mutatis mutandis", "with necessary changes"),
    ("inter alia", "among other things"),
    ("bona fide", "genuine"),
    ("status quo", "current state"),
    ("de facto", "in fact"),
    ("de jure", "by law"),
    ("per se", "by itself"),
    ("viz.", "namely"),
    ("i.e.", "that is"),
    ("e.g.", "for example"),
    ("et al.", "and others"),
    ("ibid.", "in the same place"),
    ("supra", "above"),
    ("infra", "below"),
    ("ipso facto", "by that fact"),
    ("quid pro quo", "something for something"),
    ("ultra vires", "beyond power"),
    ("ab initio", "from the start"),
    ("in lieu of", "instead of"),
    ("in re", "regarding"),
    ("in situ", "in its original place"),
    ("in toto", "completely"),
    ("in personam", "against a person"),
    ("in rem", "against a thing"),
    ("sui generis", "unique"),
    ("caveat emptor", "buyer beware"),
    ("pro rata", "proportionally"),
    ("sine qua non", "essential part"),
    ("res ipsa loquitur", "the thing speaks for itself"),
    ("pro bono", "for free"),
    ("ex parte", "from one side only"),
    ("modus operandi", "way of doing things"),
    ("per curiam", "by the court"),
    ("sub judice", "under judgment"),
    ("amicus curiae", "friend of the court"),
    ("obiter dictum", "side remark"),
    ("habeas corpus", "produce the body"),
    ("stare decisis", "stand by decided cases"),
    ("corpus delicti", "body of the crime"),
    ("mens rea", "guilty mind"),
    ("actus reus", "guilty act"),
    ("mala in se", "wrong in itself"),
    ("mala prohibita", "wrong because prohibited"),
    ("res judicata", "already decided"),
    // Terms of art
    ("force majeure", "unexpected event"),
    ("quantum meruit", "reasonable payment"),
    ("estoppel", "can't deny"),
    ("injunction", "court order"),
    ("tort", "harm"),
    ("lien", "legal claim"),
    ("enjoin", "order"),
    ("stipulate", "state clearly"),
    ("covenant", "promise"),
    ("indemnify", "protect from loss"),
    ("jurisdiction", "authority"),
    ("consideration", "payment or exchange"),
    ("waiver", "giving up rights"),
    ("subject to", "depending on"),
    ("subpoena", "court order"),
    ("affidavit", "written statement"),
    ("deposition", "testimony"),
    ("interrogatory", "written question"),
    ("statute of limitations", "time limit"),
    ("voir dire", "jury selection"),
    ("liquidated damages", "agreed payment for breach"),
    ("specific performance", "court-ordered fulfillment"),
    // Stock phrases
    ("party of the first part", "the first person"),
    ("party of the second part", "the second person"),
    ("for the avoidance of doubt", "to be clear"),
    ("for all intents and purposes", "in every way"),
    ("in the event that", "if"),
    ("in the absence of", "without"),
    ("at the sole discretion of", "chosen only by"),
    ("in accordance with", "following"),
    ("with reference to", "about"),
    ("with respect to", "about"),
    ("with regard to", "about"),
    ("for the purpose of", "to"),
    ("prior to", "before"),
    ("subsequent to", "after"),
    ("in excess of", "more than"),
    ("in connection with", "related to"),
    ("in relation to", "about"),
    ("in the course of", "during"),
    ("on the basis of", "because of"),
    ("on the grounds that", "because"),
    ("by virtue of", "because of"),
    ("in light of", "because of"),
    ("for the benefit of", "for"),
    ("for and on behalf of", "for"),
    ("from time to time", "sometimes"),
    ("as the case may be", "as needed"),
    ("set forth", "written"),
    ("cease and desist", "stop"),
    ("acknowledged and agreed", "accepted"),
    ("represents and warrants", "promises"),
    ("terms and conditions", "rules"),
    ("force and effect", "power"),
    ("indemnify and hold harmless", "protect"),
    ("due and payable", "owed"),
    ("execute and deliver", "sign"),
    ("assign and transfer", "give"),
    ("rights and remedies", "options"),
    ("right, title and interest", "ownership"),
    ("covenants and agreements", "promises"),
    ("successors and assigns", "future owners"),
];

static LOOKUP: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| GLOSSARY.iter().copied().collect());

/// One alternation over the whole glossary, longest terms first.
static TERM: Lazy<Regex> = Lazy::new(|| {
    let mut terms: Vec<&str> = GLOSSARY.iter().map(|(term, _)| *term).collect();
    terms.sort_by_key(|term| std::cmp::Reverse(term.len()));
    let alternation = terms
        .iter()
        .map(|term| term_pattern(term))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})", alternation)).unwrap()
});

/// A glossary term that was replaced, with how often.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Replacement {
    pub term: &'static str,
    pub plain: &'static str,
    pub count: usize,
}

/// Plain-language text plus the replacements made, in order of first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Simplified {
    pub text: String,
    pub replacements: Vec<Replacement>,
}

/// Rewrites the glossary terms in `text` in plain language.
pub fn simplify(text: &str) -> Simplified {
    let mut replacements: Vec<Replacement> = Vec::new();
    let rewritten = TERM.replace_all(text, |caps: &Captures| {
        let matched = &caps[0];
        let key = matched
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let Some((&term, &plain)) = LOOKUP.get_key_value(key.as_str()) else {
            return matched.to_string();
        };
        match replacements.iter_mut().find(|r| r.term == term) {
            Some(r) => r.count += 1,
            None => replacements.push(Replacement {
                term,
                plain,
                count: 1,
            }),
        }
        match_case(matched, plain)
    });

    Simplified {
        text: rewritten.into_owned(),
        replacements,
    }
}

fn term_pattern(term: &str) -> String {
    let mut pattern = term
        .split(' ')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    // "e.g." ends in punctuation, which already bounds it
    if term.ends_with(|c: char| c.is_alphanumeric()) {
        pattern.push_str(r"\b");
    }
    pattern
}

/// `SHALL` → `WILL`, `Shall` → `Will`, `shall` → `will`.
fn match_case(original: &str, plain: &str) -> String {
    let letters: Vec<char> = original.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return plain.to_uppercase();
    }
    if original.chars().next().is_some_and(|c| c.is_uppercase()) {
        let mut chars = plain.chars();
        if let Some(first) = chars.next() {
            return first.to_uppercase().chain(chars).collect();
        }
    }
    plain.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_terms_and_phrases() {
        let out = simplify("The Tenant shall pay rent pursuant to clause 4.");
        assert_eq!(out.text, "The Tenant will pay rent according to clause 4.");
        assert_eq!(out.replacements.len(), 2);
        assert_eq!(out.replacements[0].term, "shall");
        assert_eq!(out.replacements[1].plain, "according to");
    }

    #[test]
    fn keeps_the_case_of_the_match() {
        assert_eq!(
            simplify("Notwithstanding clause 2, rent is due.").text,
            "Even though clause 2, rent is due."
        );
        assert_eq!(
            simplify("FORCE MAJEURE EVENTS").text,
            "UNEXPECTED EVENT EVENTS"
        );
    }

    #[test]
    fn matches_whole_words_only() {
        let text = "A shallow tortoise met an alien at the venue.";
        let out = simplify(text);
        assert_eq!(out.text, text);
        assert!(out.replacements.is_empty());
    }

    #[test]
    fn longest_entry_wins() {
        assert_eq!(
            simplify("The Tenant shall indemnify and hold harmless the Landlord.").text,
            "The Tenant will protect the Landlord."
        );
        assert_eq!(
            simplify("In witness whereof the parties sign.").text,
            "As proof the parties sign."
        );
    }

    #[test]
    fn phrases_match_across_line_breaks() {
        assert_eq!(
            simplify("This clause is null and\nvoid.").text,
            "This clause is not valid."
        );
    }

    #[test]
    fn abbreviations_with_periods() {
        assert_eq!(
            simplify("fees, e.g. late fees, i.e. penalties").text,
            "fees, for example late fees, that is penalties"
        );
    }

    #[test]
    fn counts_repeated_terms() {
        let out = simplify("Tenant shall pay. Landlord shall repair. Both SHALL comply.");
        assert_eq!(
            out.text,
            "Tenant will pay. Landlord will repair. Both WILL comply."
        );
        assert_eq!(
            out.replacements,
            vec![Replacement {
                term: "shall",
                plain: "will",
                count: 3
            }]
        );
    }

    #[test]
    fn glossary_terms_are_normalized() {
        for (term, plain) in GLOSSARY {
            assert_eq!(*term, term.to_lowercase(), "{}", term);
            assert!(!term.contains("  "), "{}", term);
            assert!(!plain.is_empty(), "{}", term);
        }
    }
}
