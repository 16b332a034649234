//! Turns a cart into a frozen checkout order.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use std::sync::Arc;
use validator::Validate;

use super::catalog::ProductCatalog;
use super::policy::{ReservationPolicyService, ReservationSettings};
use crate::cart::{CartPersistence, CartStore};
use crate::error::CheckoutError;
use crate::models::{CartItem, CheckoutOrder};

pub struct CheckoutSessionBuilder {
    policy: Arc<ReservationPolicyService>,
    catalog: Arc<dyn ProductCatalog>,
    return_url: String,
    utc_offset: FixedOffset,
}

impl CheckoutSessionBuilder {
    pub fn new(
        policy: Arc<ReservationPolicyService>,
        catalog: Arc<dyn ProductCatalog>,
        return_url: String,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            policy,
            catalog,
            return_url,
            utc_offset,
        }
    }

    pub fn return_url(&self) -> &str {
        &self.return_url
    }

    /// Validates `cart` against booking policy and product limits and
    /// freezes it into an order. Nothing is written anywhere.
    pub async fn build_order<P: CartPersistence>(
        &self,
        cart: &CartStore<P>,
    ) -> Result<CheckoutOrder, CheckoutError> {
        self.build_order_at(cart, Utc::now()).await
    }

    pub async fn build_order_at<P: CartPersistence>(
        &self,
        cart: &CartStore<P>,
        now: DateTime<Utc>,
    ) -> Result<CheckoutOrder, CheckoutError> {
        if cart.is_empty() {
            return Err(CheckoutError::validation("Cart is empty"));
        }

        let settings = self.policy.get_settings().await;
        let window = BookingWindow::new(settings, now.with_timezone(&self.utc_offset))?;

        for line in cart.items() {
            line.validate().map_err(|e| {
                CheckoutError::validation(format!("{}: {}", display_name(line), e))
            })?;
            window.check(line)?;
            self.check_participants(line).await?;
        }

        let amount = cart.compute_total();
        if amount == 0 {
            return Err(CheckoutError::validation(
                "Order total must be greater than zero",
            ));
        }

        let order = CheckoutOrder::new(
            generate_order_id(now),
            amount,
            goods_name(cart.items()),
            self.return_url.clone(),
            cart.items().to_vec(),
            now,
        );
        tracing::debug!(
            order_id = %order.order_id(),
            amount,
            lines = cart.count(),
            "Checkout order built"
        );
        Ok(order)
    }

    async fn check_participants(&self, line: &CartItem) -> Result<(), CheckoutError> {
        let bounds = self
            .catalog
            .participant_bounds(&line.product_id)
            .await?
            .ok_or_else(|| {
                CheckoutError::validation(format!("{} is no longer available", display_name(line)))
            })?;

        if !bounds.contains(line.participants) {
            return Err(CheckoutError::validation(format!(
                "{} accepts between {} and {} participants",
                display_name(line),
                bounds.min,
                bounds.max
            )));
        }
        Ok(())
    }
}

/// Bookable range in the business's local calendar.
struct BookingWindow {
    settings: ReservationSettings,
    earliest: DateTime<FixedOffset>,
    latest_date: NaiveDate,
}

impl BookingWindow {
    fn new(
        settings: ReservationSettings,
        local_now: DateTime<FixedOffset>,
    ) -> Result<Self, CheckoutError> {
        let earliest = local_now
            .checked_add_signed(Duration::hours(i64::from(settings.min_notice_hours)))
            .ok_or_else(|| CheckoutError::validation("Minimum booking notice is out of range"))?;
        let latest_date = local_now
            .date_naive()
            .checked_add_signed(Duration::days(i64::from(settings.advance_days)))
            .unwrap_or(NaiveDate::MAX);
        Ok(Self {
            settings,
            earliest,
            latest_date,
        })
    }

    fn check(&self, line: &CartItem) -> Result<(), CheckoutError> {
        if line.reservation_date > self.latest_date {
            return Err(CheckoutError::validation(format!(
                "{} can be booked at most {} days ahead",
                display_name(line),
                self.settings.advance_days
            )));
        }

        let too_soon = match line.reservation_time {
            Some(time) => line.reservation_date.and_time(time) < self.earliest.naive_local(),
            None => line.reservation_date < self.earliest.date_naive(),
        };
        if too_soon {
            return Err(CheckoutError::validation(format!(
                "{} must be booked at least {} hours in advance",
                display_name(line),
                self.settings.min_notice_hours
            )));
        }
        Ok(())
    }
}

fn display_name(line: &CartItem) -> &str {
    if line.product_name.is_empty() {
        &line.product_id
    } else {
        &line.product_name
    }
}

/// `ORD-<unix millis>-<12 hex digits>`; never derived from cart content.
pub fn generate_order_id(now: DateTime<Utc>) -> String {
    let suffix = rand::random::<u64>() & 0xffff_ffff_ffff;
    format!("ORD-{}-{:012x}", now.timestamp_millis(), suffix)
}

fn goods_name(items: &[CartItem]) -> String {
    match items {
        [] => String::new(),
        [only] => display_name(only).to_string(),
        [first, rest @ ..] => format!("{} and {} more", display_name(first), rest.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::MemoryCartPersistence;
    use crate::models::SelectedOption;
    use crate::services::catalog::InMemoryProductCatalog;
    use crate::services::policy::{InMemoryPolicySource, ADVANCE_DAYS_KEY, MIN_NOTICE_HOURS_KEY};
    use chrono::{NaiveTime, TimeZone};

    // 2026-10-17 10:00 in UTC+9.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 1, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn builder(rows: &[(&str, &str)]) -> CheckoutSessionBuilder {
        let source = Arc::new(InMemoryPolicySource::new(rows));
        let policy = Arc::new(ReservationPolicyService::new(
            source,
            std::time::Duration::from_secs(1800),
        ));
        let catalog = InMemoryProductCatalog::new()
            .with_product("farm", 1, 40)
            .with_product("museum", 5, 30);
        CheckoutSessionBuilder::new(
            policy,
            Arc::new(catalog),
            "https://shop.example/payments/callback".to_string(),
            FixedOffset::east_opt(9 * 3600).unwrap(),
        )
    }

    fn line(id: &str, name: &str, price: u64, participants: u32, on: NaiveDate) -> CartItem {
        CartItem {
            product_id: id.to_string(),
            product_name: name.to_string(),
            thumbnail: None,
            vendor_name: Some("Green Farm".to_string()),
            sale_price: price,
            participants,
            reservation_date: on,
            reservation_time: None,
            options: vec![],
        }
    }

    fn cart(items: Vec<CartItem>) -> CartStore<Arc<MemoryCartPersistence>> {
        CartStore::load(Arc::new(MemoryCartPersistence::with_items(items)))
    }

    #[tokio::test]
    async fn empty_cart_is_rejected() {
        let err = builder(&[])
            .build_order_at(&cart(vec![]), now())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
    }

    #[tokio::test]
    async fn freezes_total_and_describes_goods() {
        let mut farm = line("farm", "Farm visit", 10_000, 2, date(2026, 11, 2));
        farm.options = vec![SelectedOption {
            option_id: "lunch".to_string(),
            name: "Lunch box".to_string(),
            price: 500,
            quantity: 2,
        }];
        let museum = line("museum", "Museum tour", 2_000, 5, date(2026, 11, 3));
        let persistence = Arc::new(MemoryCartPersistence::with_items(vec![farm, museum]));
        let cart = CartStore::load(persistence.clone());

        let order = builder(&[]).build_order_at(&cart, now()).await.unwrap();

        assert_eq!(order.amount(), 31_000);
        assert_eq!(order.goods_name(), "Farm visit and 1 more");
        assert_eq!(order.lines().len(), 2);
        assert!(order.order_id().starts_with(&format!("ORD-{}-", now().timestamp_millis())));
        assert_eq!(persistence.save_count(), 0);
    }

    #[tokio::test]
    async fn order_ids_differ_for_identical_carts() {
        let b = builder(&[]);
        let c = cart(vec![line("farm", "Farm visit", 10_000, 2, date(2026, 11, 2))]);
        let first = b.build_order_at(&c, now()).await.unwrap();
        let second = b.build_order_at(&c, now()).await.unwrap();
        assert_ne!(first.order_id(), second.order_id());
        assert_eq!(first.amount(), second.amount());
    }

    #[tokio::test]
    async fn date_beyond_advance_window_is_rejected() {
        let b = builder(&[(ADVANCE_DAYS_KEY, "30")]);
        let ok = cart(vec![line("farm", "Farm", 1_000, 1, date(2026, 11, 16))]);
        let late = cart(vec![line("farm", "Farm", 1_000, 1, date(2026, 11, 17))]);

        assert!(b.build_order_at(&ok, now()).await.is_ok());
        assert!(matches!(
            b.build_order_at(&late, now()).await,
            Err(CheckoutError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn minimum_notice_uses_time_when_present() {
        // Earliest bookable moment: 2026-10-19 10:00 local.
        let b = builder(&[(MIN_NOTICE_HOURS_KEY, "48")]);

        let day_before = cart(vec![line("farm", "Farm", 1_000, 1, date(2026, 10, 18))]);
        assert!(b.build_order_at(&day_before, now()).await.is_err());

        let same_day = cart(vec![line("farm", "Farm", 1_000, 1, date(2026, 10, 19))]);
        assert!(b.build_order_at(&same_day, now()).await.is_ok());

        let mut early = line("farm", "Farm", 1_000, 1, date(2026, 10, 19));
        early.reservation_time = NaiveTime::from_hms_opt(9, 0, 0);
        assert!(b.build_order_at(&cart(vec![early]), now()).await.is_err());

        let mut later = line("farm", "Farm", 1_000, 1, date(2026, 10, 19));
        later.reservation_time = NaiveTime::from_hms_opt(11, 0, 0);
        assert!(b.build_order_at(&cart(vec![later]), now()).await.is_ok());
    }

    #[tokio::test]
    async fn past_dates_are_rejected_without_notice() {
        let b = builder(&[]);
        let past = cart(vec![line("farm", "Farm", 1_000, 1, date(2026, 10, 16))]);
        assert!(b.build_order_at(&past, now()).await.is_err());
    }

    #[tokio::test]
    async fn participants_outside_bounds_are_rejected() {
        let b = builder(&[]);
        let few = cart(vec![line("museum", "Museum", 1_000, 4, date(2026, 11, 2))]);
        let err = b.build_order_at(&few, now()).await.unwrap_err();
        assert_eq!(err.to_string(), "Museum accepts between 5 and 30 participants");

        let many = cart(vec![line("museum", "Museum", 1_000, 31, date(2026, 11, 2))]);
        assert!(b.build_order_at(&many, now()).await.is_err());
    }

    #[tokio::test]
    async fn unknown_product_is_rejected() {
        let b = builder(&[]);
        let gone = cart(vec![line("closed", "Closed zoo", 1_000, 2, date(2026, 11, 2))]);
        assert!(matches!(
            b.build_order_at(&gone, now()).await,
            Err(CheckoutError::Validation(_))
        ));
    }
}
