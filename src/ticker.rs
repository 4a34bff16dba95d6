//! # ticker — แปลง Kalshi ticker เป็นชื่อที่คนอ่านรู้เรื่อง
//!
//! ```text
//! KXBTCD-26JAN2901-T88249.99      → Bitcoin Daily Below $88,249.99 · Jan 29
//! KXNBAGAME-26JAN28LALCLE-CLE     → NBA Game · CLE · Jan 28
//! KXBTCMAXMON-BTC-26JAN31-105000  → Bitcoin Max Monthly $105,000 · Jan 31
//! ```

const PREFIXES: &[(&str, &str)] = &[
    ("KXBTCD",       "Bitcoin Daily"),
    ("KXBTC",        "Bitcoin"),
    ("KXBTCMAX",     "Bitcoin Max"),
    ("KXBTCMAXMON",  "Bitcoin Max Monthly"),
    ("KXBTCMIN",     "Bitcoin Min"),
    ("KXBTCW",       "Bitcoin Weekly"),
    ("KXETHD",       "Ethereum Daily"),
    ("KXETH",        "Ethereum"),
    ("KXETHW",       "Ethereum Weekly"),
    ("KXNBA",        "NBA"),
    ("KXNBAMENTION", "NBA Mention"),
    ("KXNBAGAME",    "NBA Game"),
    ("KXNFL",        "NFL"),
    ("KXNFLSB",      "NFL Super Bowl"),
    ("KXNFLSBMVP",   "NFL SB MVP"),
    ("KXNFLMVP",     "NFL MVP"),
    ("KXNFLANYTD",   "NFL Any TD"),
    ("KXSOCCER",     "Soccer"),
    ("KXMLB",        "MLB"),
    ("KXNHL",        "NHL"),
    ("KXLOWTAUS",    "Australia CPI"),
    ("KXCPI",        "CPI"),
    ("KXFED",        "Fed Rate"),
    ("KXGDP",        "GDP"),
    ("KXSP500",      "S&P 500"),
    ("KXNAS",        "Nasdaq"),
];

const MONTHS: &[(&str, &str)] = &[
    ("JAN", "Jan"), ("FEB", "Feb"), ("MAR", "Mar"), ("APR", "Apr"),
    ("MAY", "May"), ("JUN", "Jun"), ("JUL", "Jul"), ("AUG", "Aug"),
    ("SEP", "Sep"), ("OCT", "Oct"), ("NOV", "Nov"), ("DEC", "Dec"),
];

const SKIP_EXTRAS: &[&str] = &["BTC", "ETH"];

/// prefix ที่ยาวที่สุดที่ match (ตัวเลขต่อท้าย เช่น `KXBTCMAX150` ไม่มีผล)
fn find_prefix(head: &str) -> Option<&'static str> {
    PREFIXES
        .iter()
        .filter(|(p, _)| head.starts_with(p))
        .max_by_key(|(p, _)| p.len())
        .map(|(_, name)| *name)
}

/// หา `YYMMMDD` ใน segment → (ตำแหน่งเริ่ม, "Jan 29", ตำแหน่งจบ)
fn find_date(seg: &str) -> Option<(usize, String, usize)> {
    let b = seg.as_bytes();
    if b.len() < 7 {
        return None;
    }
    for start in 0..=b.len() - 7 {
        let w = &b[start..start + 7];
        let digits = |r: &[u8]| r.iter().all(|c| c.is_ascii_digit());
        let upper = |r: &[u8]| r.iter().all(|c| c.is_ascii_uppercase());
        if !(digits(&w[0..2]) && upper(&w[2..5]) && digits(&w[5..7])) {
            continue;
        }
        let month = std::str::from_utf8(&w[2..5]).ok()?;
        let Some((_, display)) = MONTHS.iter().find(|(m, _)| *m == month) else {
            continue;
        };
        let day: u32 = std::str::from_utf8(&w[5..7]).ok()?.parse().ok()?;
        if (1..=31).contains(&day) {
            return Some((start, format!("{display} {day}"), start + 7));
        }
    }
    None
}

fn format_dollars(num: f64) -> String {
    let cents = (num * 100.0).round() as i64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    if frac == 0 {
        format!("${grouped}")
    } else {
        format!("${grouped}.{frac:02}")
    }
}

fn parse_number(s: &str) -> Option<f64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }
    s.parse().ok()
}

/// `T90749.99` → ("Below", "$90,749.99"), `B105000` → ("Above", "$105,000")
fn parse_threshold(seg: &str) -> Option<(&'static str, String)> {
    let direction = match seg.as_bytes().first()? {
        b'T' => "Below",
        b'B' => "Above",
        _ => return None,
    };
    parse_number(&seg[1..]).map(|n| (direction, format_dollars(n)))
}

pub fn decode_ticker(ticker: &str) -> String {
    if ticker.is_empty() {
        return String::new();
    }

    let mut parts = ticker.split('-');
    let head = parts.next().unwrap_or_default();
    let Some(name) = find_prefix(head) else {
        return ticker.to_string();
    };

    let mut date: Option<String> = None;
    let mut threshold: Option<(&str, String)> = None;
    let mut extras: Vec<String> = Vec::new();

    for seg in parts {
        if let Some((0, d, _)) = find_date(seg) {
            date = Some(d);
            continue;
        }
        if let Some(t) = parse_threshold(seg) {
            threshold = Some(t);
            continue;
        }
        // ปี/ฤดูกาล เช่น "26"
        if seg.len() == 2 && seg.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if let Some(n) = parse_number(seg) {
            if n > 100.0 {
                threshold = Some(("", format_dollars(n)));
                continue;
            }
        }
        // team-date combo เช่น 26JAN28LALCLE
        if let Some((_, d, end)) = find_date(seg) {
            date = Some(d);
            if end < seg.len() {
                extras.push(seg[end..].to_string());
            }
            continue;
        }

        let upper = seg.to_ascii_uppercase();
        if SKIP_EXTRAS.contains(&upper.as_str()) {
            continue;
        }
        if upper == "NOTD" {
            extras.push("No TD".to_string());
        } else {
            extras.push(seg.to_string());
        }
    }

    let mut out = name.to_string();
    if let Some((dir, amount)) = threshold {
        if dir.is_empty() {
            out.push_str(&format!(" {amount}"));
        } else {
            out.push_str(&format!(" {dir} {amount}"));
        }
    }
    if !extras.is_empty() {
        out.push_str(" · ");
        out.push_str(&extras.join(" · "));
    }
    if let Some(d) = date {
        out.push_str(&format!(" · {d}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitcoin_daily_threshold() {
        assert_eq!(
            decode_ticker("KXBTCD-26JAN2901-T88249.99"),
            "Bitcoin Daily Below $88,249.99 · Jan 29"
        );
    }

    #[test]
    fn whole_dollar_threshold_and_skip_extras() {
        assert_eq!(
            decode_ticker("KXBTCMAXMON-BTC-26JAN31-105000"),
            "Bitcoin Max Monthly $105,000 · Jan 31"
        );
        assert_eq!(decode_ticker("KXETHD-26FEB0317-B3500"), "Ethereum Daily Above $3,500 · Feb 3");
    }

    #[test]
    fn season_and_team_codes() {
        assert_eq!(decode_ticker("KXNBA-26-MIA"), "NBA · MIA");
        assert_eq!(
            decode_ticker("KXNBAGAME-26JAN28LALCLE-CLE"),
            "NBA Game · CLE · Jan 28"
        );
    }

    #[test]
    fn numeric_prefix_variant_and_no_td() {
        assert_eq!(decode_ticker("KXBTCMAX150-25-DEC31"), "Bitcoin Max · DEC31");
        assert_eq!(decode_ticker("KXNFLANYTD-26FEB08-NOTD"), "NFL Any TD · No TD · Feb 8");
    }

    #[test]
    fn unknown_prefix_returns_ticker() {
        assert_eq!(decode_ticker("FOO-BAR"), "FOO-BAR");
        assert_eq!(decode_ticker(""), "");
    }

    #[test]
    fn dollar_formatting() {
        assert_eq!(format_dollars(1234567.5), "$1,234,567.50");
        assert_eq!(format_dollars(999.0), "$999");
    }
}
