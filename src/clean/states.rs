use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Regions that never reach the warehouse: the two cruise-ship entries
/// and the synthetic `Recovered` aggregate row the feed carries.
pub static EXCLUDED_STATES: &[&str] = &["Diamond Princess", "Grand Princess", "Recovered"];

/// Province_State values with a USPS code, territories included.
static US_STATE_ABBREV: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Alabama", "AL"),
        ("Alaska", "AK"),
        ("American Samoa", "AS"),
        ("Arizona", "AZ"),
        ("Arkansas", "AR"),
        ("California", "CA"),
        ("Colorado", "CO"),
        ("Connecticut", "CT"),
        ("Delaware", "DE"),
        ("District of Columbia", "DC"),
        ("Florida", "FL"),
        ("Georgia", "GA"),
        ("Guam", "GU"),
        ("Hawaii", "HI"),
        ("Idaho", "ID"),
        ("Illinois", "IL"),
        ("Indiana", "IN"),
        ("Iowa", "IA"),
        ("Kansas", "KS"),
        ("Kentucky", "KY"),
        ("Louisiana", "LA"),
        ("Maine", "ME"),
        ("Maryland", "MD"),
        ("Massachusetts", "MA"),
        ("Michigan", "MI"),
        ("Minnesota", "MN"),
        ("Mississippi", "MS"),
        ("Missouri", "MO"),
        ("Montana", "MT"),
        ("Nebraska", "NE"),
        ("Nevada", "NV"),
        ("New Hampshire", "NH"),
        ("New Jersey", "NJ"),
        ("New Mexico", "NM"),
        ("New York", "NY"),
        ("North Carolina", "NC"),
        ("North Dakota", "ND"),
        ("Northern Mariana Islands", "MP"),
        ("Ohio", "OH"),
        ("Oklahoma", "OK"),
        ("Oregon", "OR"),
        ("Pennsylvania", "PA"),
        ("Puerto Rico", "PR"),
        ("Rhode Island", "RI"),
        ("South Carolina", "SC"),
        ("South Dakota", "SD"),
        ("Tennessee", "TN"),
        ("Texas", "TX"),
        ("Utah", "UT"),
        ("Vermont", "VT"),
        ("Virgin Islands", "VI"),
        ("Virginia", "VA"),
        ("Washington", "WA"),
        ("West Virginia", "WV"),
        ("Wisconsin", "WI"),
        ("Wyoming", "WY"),
    ])
});

/// USPS code for a Province_State value, `None` for unmapped regions.
pub fn state_code(province_state: &str) -> Option<&'static str> {
    US_STATE_ABBREV.get(province_state).copied()
}

pub fn is_excluded(province_state: &str) -> bool {
    EXCLUDED_STATES.contains(&province_state)
}
