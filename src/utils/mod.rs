use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Identity key for a league/team/sport name: trimmed, inner whitespace
/// collapsed, lower-cased.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Identity key for a sport. Vendors disagree on "soccer" vs "football".
pub fn normalize_sport(sport: &str) -> String {
    let key = normalize_name(sport);
    match key.as_str() {
        "soccer" | "association football" => "football".to_string(),
        _ => key,
    }
}

/// Canonical snake_case form of a vendor column or field name
/// (e.g. "HomeTeam" -> "home_team", "Match Date" -> "match_date").
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = if i > 0 { chars.get(i - 1).copied() } else { None };
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c.is_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Parse the date spellings the supported vendors use into UTC.
///
/// Accepts RFC 3339 (`2024-08-16T19:00:00Z`), `YYYY-MM-DD HH:MM[:SS]`,
/// `YYYY-MM-DD`, `DD/MM/YYYY` and `DD/MM/YY`. An optional kick-off `time`
/// (`HH:MM` or `HH:MM:SS`) is applied to date-only values; otherwise midnight
/// UTC is assumed.
pub fn parse_match_datetime(date: &str, time: Option<&str>) -> Option<DateTime<Utc>> {
    let date = date.trim();
    if date.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(date, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    let day = parse_date(date)?;
    let kick_off = time
        .map(str::trim)
        .and_then(|t| {
            NaiveTime::parse_from_str(t, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
                .ok()
        })
        .unwrap_or(NaiveTime::MIN);
    Some(Utc.from_utc_datetime(&day.and_time(kick_off)))
}

/// Date-only parsing shared by `parse_match_datetime` and CLI arguments.
pub fn parse_date(date: &str) -> Option<NaiveDate> {
    let date = date.trim();
    if date.contains('/') {
        let year_len = date.rsplit('/').next().map_or(0, str::len);
        let fmt = if year_len == 2 { "%d/%m/%y" } else { "%d/%m/%Y" };
        return NaiveDate::parse_from_str(date, fmt).ok();
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Start year of a season label. football-data.co.uk uses two-digit pairs
/// ("2324", "9900"), football-data.org the start year ("2023"), openfootball
/// "2023-24".
pub fn season_start_year(label: &str) -> Option<i32> {
    let label = label.trim();
    match label.len() {
        4 => {
            let first: i32 = label.get(..2)?.parse().ok()?;
            let second: i32 = label.get(2..)?.parse().ok()?;
            if (first + 1) % 100 == second {
                let century = if first >= 90 { 1900 } else { 2000 };
                Some(century + first)
            } else {
                label.parse().ok()
            }
        }
        7 => label.get(..4)?.parse().ok(),
        _ => None,
    }
}

/// True when a season that starts in `start_year` can still contain
/// fixtures on or after `since` (seasons straddle the new year).
pub fn season_overlaps_since(start_year: i32, since: NaiveDate) -> bool {
    use chrono::Datelike;
    start_year + 1 >= since.year()
}

/// Rejects values that would make useless identity keys.
pub fn validate_entity_name(name: &str) -> bool {
    !name.trim().is_empty() && name.len() <= 100
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Premier   League "), "premier league");
        assert_eq!(normalize_name("PREMIER LEAGUE"), "premier league");
        assert_ne!(normalize_name("Man United"), normalize_name("Manchester United"));
    }

    #[test]
    fn test_normalize_sport() {
        assert_eq!(normalize_sport("Soccer"), "football");
        assert_eq!(normalize_sport(" Football "), "football");
        assert_eq!(normalize_sport("Basketball"), "basketball");
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("HomeTeam"), "home_team");
        assert_eq!(to_snake_case("FTHG"), "fthg");
        assert_eq!(to_snake_case("B365H"), "b365h");
        assert_eq!(to_snake_case("Match Date"), "match_date");
        assert_eq!(to_snake_case("utcDate"), "utc_date");
        assert_eq!(to_snake_case("home_score"), "home_score");
        assert_eq!(to_snake_case(" league-name "), "league_name");
    }

    #[test]
    fn test_parse_match_datetime() {
        let dt = parse_match_datetime("2023-08-11T19:00:00Z", None).unwrap();
        assert_eq!(dt.hour(), 19);

        let dt = parse_match_datetime("11/08/23", Some("20:00")).unwrap();
        assert_eq!(dt.to_rfc3339(), "2023-08-11T20:00:00+00:00");

        let dt = parse_match_datetime("11/08/2023", None).unwrap();
        assert_eq!(dt.to_rfc3339(), "2023-08-11T00:00:00+00:00");

        let dt = parse_match_datetime("2023-08-11", Some("15:00:00")).unwrap();
        assert_eq!(dt.hour(), 15);

        assert!(parse_match_datetime("", None).is_none());
        assert!(parse_match_datetime("next tuesday", None).is_none());
    }

    #[test]
    fn test_season_helpers() {
        assert_eq!(season_start_year("2324"), Some(2023));
        assert_eq!(season_start_year("2023"), Some(2023));
        assert_eq!(season_start_year("2022-23"), Some(2022));
        assert_eq!(season_start_year("2021"), Some(2020));
        assert_eq!(season_start_year("9900"), Some(1999));
        assert_eq!(season_start_year("1é1"), None);
        assert_eq!(season_start_year("é2023-"), None);
        let since = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(season_overlaps_since(2023, since));
        assert!(!season_overlaps_since(2021, since));
    }

    #[test]
    fn test_validate_entity_name() {
        assert!(validate_entity_name("Arsenal"));
        assert!(!validate_entity_name("   "));
        assert!(!validate_entity_name(&"x".repeat(101)));
    }
}
