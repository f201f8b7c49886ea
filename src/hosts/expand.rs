// src/hosts/expand.rs

use std::sync::OnceLock;

use regex::Regex;

use crate::errors::{HpcExecError, Result};

fn bracket_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^\[\]]*)\[([^\[\]]+)\](.*)$").expect("static bracket regex is valid")
    })
}

/// Largest number of hosts a single pattern may expand to.
pub const MAX_EXPANSION: u64 = 1 << 20;

/// Expand a node-list pattern into concrete host names.
///
/// `comp-[01-03,07]` expands to `comp-01, comp-02, comp-03, comp-07`. Zero
/// padding is taken from the width of the range start. Several bracket groups
/// (`rack[1-2]-n[1-2]`) expand as a cartesian product, left to right.
/// Patterns naming more than [`MAX_EXPANSION`] hosts are rejected.
pub fn expand_pattern(pattern: &str) -> Result<Vec<String>> {
    count_pattern(pattern)?;
    expand_unchecked(pattern)
}

fn expand_unchecked(pattern: &str) -> Result<Vec<String>> {
    let pattern = pattern.trim();
    let Some((prefix, ranges, rest)) = split_pattern(pattern)? else {
        return Ok(if pattern.is_empty() {
            Vec::new()
        } else {
            vec![pattern.to_string()]
        });
    };

    let tails = expand_unchecked(rest)?;
    let tails = if tails.is_empty() { vec![String::new()] } else { tails };

    let mut out = Vec::new();
    for part in ranges.split(',') {
        match parse_range(part.trim(), pattern)? {
            Range::Single(id) => {
                for tail in &tails {
                    out.push(format!("{prefix}{id}{tail}"));
                }
            }
            Range::Span { lo, hi, width } => {
                for n in lo..=hi {
                    for tail in &tails {
                        out.push(format!("{prefix}{n:0width$}{tail}"));
                    }
                }
            }
        }
    }
    Ok(out)
}

/// Count the hosts in `pattern` without building them.
fn count_pattern(pattern: &str) -> Result<u64> {
    let pattern = pattern.trim();
    let too_large = || {
        HpcExecError::config(format!(
            "host pattern '{pattern}' names more than {MAX_EXPANSION} hosts"
        ))
    };

    let Some((_, ranges, rest)) = split_pattern(pattern)? else {
        return Ok(u64::from(!pattern.is_empty()));
    };

    let tails = count_pattern(rest)?.max(1);
    let mut total: u64 = 0;
    for part in ranges.split(',') {
        let ids = parse_range(part.trim(), pattern)?.len();
        total = ids
            .checked_mul(tails)
            .and_then(|n| n.checked_add(total))
            .filter(|&n| n <= MAX_EXPANSION)
            .ok_or_else(too_large)?;
    }
    Ok(total)
}

/// `prefix[ranges]rest`, or `None` for a pattern without brackets.
fn split_pattern(pattern: &str) -> Result<Option<(&str, &str, &str)>> {
    match bracket_regex().captures(pattern) {
        Some(caps) => {
            let group = |i: usize| caps.get(i).map_or("", |m| m.as_str());
            Ok(Some((group(1), group(2), group(3))))
        }
        None if pattern.contains('[') || pattern.contains(']') => Err(HpcExecError::config(
            format!("unbalanced brackets in host pattern '{pattern}'"),
        )),
        None => Ok(None),
    }
}

enum Range<'a> {
    Single(&'a str),
    Span { lo: u64, hi: u64, width: usize },
}

impl Range<'_> {
    fn len(&self) -> u64 {
        match self {
            Range::Single(_) => 1,
            Range::Span { lo, hi, .. } => (hi - lo).saturating_add(1),
        }
    }
}

fn parse_range<'a>(part: &'a str, pattern: &str) -> Result<Range<'a>> {
    let bad = || {
        HpcExecError::config(format!(
            "invalid range '{part}' in host pattern '{pattern}'"
        ))
    };

    match part.split_once('-') {
        None if part.is_empty() => Err(bad()),
        None => Ok(Range::Single(part)),
        Some((start, end)) => {
            let lo: u64 = start.parse().map_err(|_| bad())?;
            let hi: u64 = end.parse().map_err(|_| bad())?;
            if hi < lo {
                return Err(bad());
            }
            Ok(Range::Span {
                lo,
                hi,
                width: start.len(),
            })
        }
    }
}

/// Number of hosts a node-list expression names.
///
/// Comma-separated top-level entries are summed, so
/// `a-[1-4],b-7` counts five hosts. Nothing is expanded.
pub fn count_expansion(node_list: &str) -> Result<usize> {
    let mut total: u64 = 0;
    for entry in split_top_level(node_list) {
        total = total
            .checked_add(count_pattern(&entry)?)
            .filter(|&n| n <= MAX_EXPANSION)
            .ok_or_else(|| {
                HpcExecError::config(format!(
                    "node list '{node_list}' names more than {MAX_EXPANSION} hosts"
                ))
            })?;
    }
    usize::try_from(total).map_err(|e| HpcExecError::config(e.to_string()))
}

/// Split on commas that are not inside brackets.
pub(crate) fn split_top_level(list: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in list.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                if !current.trim().is_empty() {
                    out.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}
