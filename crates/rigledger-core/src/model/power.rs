//! Static reference table of known miner models and their rated power draw.
//!
//! Consulted only when an uploaded row omits power entirely. Lookup is by
//! exact model name as it appears in vendor price sheets.

/// Known model name -> rated draw in watts.
const RATED_WATTS: &[(&str, u32)] = &[
    ("Antminer S19", 3250),
    ("Antminer S19 Pro", 3250),
    ("Antminer S19j Pro", 3050),
    ("Antminer S19 XP", 3010),
    ("Antminer S19k Pro", 2760),
    ("Antminer S21", 3500),
    ("Antminer S21 Pro", 3510),
    ("Antminer S21 XP", 3645),
    ("Antminer T21", 3610),
    ("Antminer L7", 3425),
    ("Antminer L9", 3360),
    ("Antminer KA3", 3154),
    ("Antminer K7", 3080),
    ("Antminer D9", 2839),
    ("Antminer E9 Pro", 2200),
    ("Antminer Z15 Pro", 2560),
    ("Whatsminer M30S", 3400),
    ("Whatsminer M30S+", 3400),
    ("Whatsminer M30S++", 3472),
    ("Whatsminer M50", 3276),
    ("Whatsminer M50S", 3276),
    ("Whatsminer M60", 3422),
    ("Whatsminer M60S", 3441),
    ("Whatsminer M66", 3456),
    ("Whatsminer M66S", 3534),
    ("Avalon A1246", 3420),
    ("Avalon A1346", 3300),
    ("Avalon A1466", 3230),
    ("Avalon A1566", 3662),
    ("Iceriver KS3", 3200),
    ("Iceriver KS5L", 3400),
    ("Goldshell KD6", 2630),
    ("Goldshell HS6", 2650),
];

/// Rated power draw in watts for an exactly-matching model name.
#[must_use]
pub fn rated_watts(name: &str) -> Option<u32> {
    RATED_WATTS
        .iter()
        .find(|(model, _)| *model == name)
        .map(|(_, watts)| *watts)
}
