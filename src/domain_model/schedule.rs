use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Day of the week, keyed on the wire by the labels stored in existing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Day {
    #[serde(rename = "Lundi")]
    Monday,
    #[serde(rename = "Mardi")]
    Tuesday,
    #[serde(rename = "Mercredi")]
    Wednesday,
    #[serde(rename = "Jeudi")]
    Thursday,
    #[serde(rename = "Vendredi")]
    Friday,
    #[serde(rename = "Samedi")]
    Saturday,
    #[serde(rename = "Dimanche")]
    Sunday,
}

impl Day {
    pub const WEEK: [Day; 7] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
        Day::Sunday,
    ];
}

/// Wall-clock time of day written as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(NaiveTime);

impl ClockTime {
    pub fn hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(ClockTime)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl std::str::FromStr for ClockTime {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map(ClockTime)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// `hm` only fails on out-of-range input; these are all literal and in range.
fn at(hour: u32) -> ClockTime {
    ClockTime(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub open: ClockTime,
    pub close: ClockTime,
}

impl Default for OpeningHours {
    fn default() -> Self {
        Self {
            open: at(9),
            close: at(22),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl Default for Shift {
    fn default() -> Self {
        Self {
            start: at(9),
            end: at(18),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAvailability {
    pub available: bool,
    pub hours: Vec<Shift>,
}

impl Default for DayAvailability {
    fn default() -> Self {
        Self {
            available: false,
            hours: vec![Shift::default()],
        }
    }
}

/// A map holding exactly one entry per [`Day`]. Days missing from
/// deserialized input are filled with the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Day, T>", bound(deserialize = "T: Default + Deserialize<'de>"))]
pub struct Weekly<T>(BTreeMap<Day, T>);

impl<T: Default> Default for Weekly<T> {
    fn default() -> Self {
        Weekly(Day::WEEK.iter().map(|day| (*day, T::default())).collect())
    }
}

impl<T: Default> From<BTreeMap<Day, T>> for Weekly<T> {
    fn from(mut days: BTreeMap<Day, T>) -> Self {
        for day in Day::WEEK {
            days.entry(day).or_default();
        }
        Weekly(days)
    }
}

impl<T: Default> Weekly<T> {
    pub fn get(&self, day: Day) -> &T {
        // Every day is populated at construction.
        &self.0[&day]
    }

    pub fn get_mut(&mut self, day: Day) -> &mut T {
        self.0.entry(day).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Day, &T)> {
        self.0.iter().map(|(day, value)| (*day, value))
    }
}

pub type WeeklyOpeningHours = Weekly<OpeningHours>;
pub type WeeklyAvailability = Weekly<DayAvailability>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Bike,
    Scooter,
    Car,
}

impl std::str::FromStr for VehicleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bike" => Ok(VehicleType::Bike),
            "scooter" => Ok(VehicleType::Scooter),
            "car" => Ok(VehicleType::Car),
            other => Err(format!("unknown vehicle type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_week_is_fully_populated() {
        let hours = WeeklyOpeningHours::default();
        assert_eq!(hours.iter().count(), 7);
        assert_eq!(hours.get(Day::Sunday).open.to_string(), "09:00");
        assert_eq!(hours.get(Day::Sunday).close.to_string(), "22:00");

        let availability = WeeklyAvailability::default();
        let monday = availability.get(Day::Monday);
        assert!(!monday.available);
        assert_eq!(monday.hours, vec![Shift::default()]);
    }

    #[test]
    fn opening_hours_use_stored_day_labels() {
        let hours = WeeklyOpeningHours::default();
        let value = serde_json::to_value(&hours).unwrap();
        assert_eq!(value["Lundi"], json!({ "open": "09:00", "close": "22:00" }));
        assert_eq!(value.as_object().unwrap().len(), 7);
    }

    #[test]
    fn partial_week_is_completed_on_read() {
        let hours: WeeklyOpeningHours =
            serde_json::from_value(json!({ "Samedi": { "open": "11:30", "close": "23:00" } }))
                .unwrap();
        assert_eq!(hours.get(Day::Saturday).open, ClockTime::hm(11, 30).unwrap());
        assert_eq!(*hours.get(Day::Tuesday), OpeningHours::default());
    }

    #[test]
    fn clock_time_rejects_garbage() {
        assert!("25:00".parse::<ClockTime>().is_err());
        assert!("noon".parse::<ClockTime>().is_err());
        assert_eq!("07:05:00".parse::<ClockTime>().unwrap().to_string(), "07:05");
    }
}
