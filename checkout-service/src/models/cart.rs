use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// One product's reservation configuration within a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[validate(length(min = 1, message = "Product id is required"))]
    pub product_id: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub vendor_name: Option<String>,
    /// Unit sale price per participant, in whole currency units.
    pub sale_price: u64,
    #[validate(range(min = 1, message = "At least one participant is required"))]
    pub participants: u32,
    pub reservation_date: NaiveDate,
    #[serde(default, with = "optional_time")]
    pub reservation_time: Option<NaiveTime>,
    #[serde(default)]
    #[validate(nested)]
    pub options: Vec<SelectedOption>,
}

/// A paid add-on chosen for a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SelectedOption {
    pub option_id: String,
    #[serde(default)]
    pub name: String,
    pub price: u64,
    #[validate(range(min = 1, message = "Option quantity must be at least 1"))]
    pub quantity: u32,
}

impl SelectedOption {
    pub fn total(&self) -> u64 {
        self.price.saturating_mul(u64::from(self.quantity))
    }
}

impl CartItem {
    /// Sale price times participants, plus every option's own price times quantity.
    ///
    /// Options are not multiplied by the participant count.
    pub fn line_total(&self) -> u64 {
        let base = self.sale_price.saturating_mul(u64::from(self.participants));
        self.options
            .iter()
            .fold(base, |acc, option| acc.saturating_add(option.total()))
    }

    pub(crate) fn apply(&mut self, patch: CartItemPatch) {
        if let Some(participants) = patch.participants {
            self.participants = participants;
        }
        if let Some(date) = patch.reservation_date {
            self.reservation_date = date;
        }
        if let Some(time) = patch.reservation_time {
            self.reservation_time = time;
        }
        if let Some(options) = patch.options {
            self.options = options;
        }
    }
}

/// Partial edit of a cart line. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartItemPatch {
    pub participants: Option<u32>,
    pub reservation_date: Option<NaiveDate>,
    /// `Some(None)` clears the time.
    pub reservation_time: Option<Option<NaiveTime>>,
    pub options: Option<Vec<SelectedOption>>,
}

/// Times travel as `HH:MM`; `HH:MM:SS` is accepted on input.
mod optional_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.serialize_str(&time.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => NaiveTime::parse_from_str(s, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(s, FORMAT))
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
