//! ledger.rs
//!
//! Леджер остатков — единственное место в системе, которому разрешено
//! менять счётчик `tickets.availability` и строки `bookings`.
//!
//! Каждая операция — одна транзакция по схеме "прочитать-проверить-записать
//! под блокировкой": сначала `SELECT ... FOR UPDATE` на строке пула, затем
//! повторное чтение уже под замком, проверка, запись счётчика и брони,
//! коммит. Конкурирующие мутации одного пула выстраиваются на блокировке
//! строки; мутации разных пулов друг другу не мешают. Победителя определяет
//! порядок коммитов, а не порядок прихода запросов.
//!
//! Ожидание замка ограничено `lock_timeout`; истёкшее ожидание, дедлок и
//! сбой сериализации наружу выходят как retryable `Conflict` (см. errors.rs).
//! Транзакция, не дошедшая до `commit`, откатывается при Drop — частичных
//! списаний не остаётся ни на одном пути выхода.

use sqlx::{Postgres, Transaction};
use tracing::debug;

use crate::database::Database;
use crate::errors::ApiError;
use crate::models::Booking;

// Ждём замок строки не дольше пяти секунд, дальше отдаём Conflict
const SET_LOCK_TIMEOUT: &str = "SET LOCAL lock_timeout = '5s'";

#[derive(Clone)]
pub struct InventoryLedger {
    db: Database,
}

impl InventoryLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Создать бронь: списать `quantity` из пула и вставить строку брони
    /// одним коммитом.
    pub async fn create_booking(
        &self,
        event_id: i64,
        ticket_id: i64,
        customer_id: i64,
        quantity: i32,
    ) -> Result<Booking, ApiError> {
        if quantity <= 0 {
            return Err(ApiError::InvalidQuantity);
        }

        let mut tx = self.begin().await?;

        // Замок на строке пула; заодно проверяем, что билет принадлежит событию
        let availability: Option<i32> = sqlx::query_scalar(
            "SELECT availability FROM tickets WHERE id = $1 AND event_id = $2 FOR UPDATE",
        )
        .bind(ticket_id)
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await?;

        let availability = availability.ok_or(ApiError::NotFound)?;
        check_reserve(availability, quantity)?;

        sqlx::query(
            "UPDATE tickets SET availability = availability - $1, updated_at = NOW()
             WHERE id = $2",
        )
        .bind(quantity)
        .bind(ticket_id)
        .execute(&mut *tx)
        .await?;

        let booking: Booking = sqlx::query_as(
            "INSERT INTO bookings (customer_id, ticket_id, event_id, quantity)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(customer_id)
        .bind(ticket_id)
        .bind(event_id)
        .bind(quantity)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            booking_id = booking.id,
            ticket_id, quantity, "booking created, quantity deducted"
        );
        Ok(booking)
    }

    /// Изменить количество в брони: списать или вернуть разницу.
    ///
    /// Старое количество перечитывается из БД уже под замком пула — значение
    /// из памяти обработчика к этому моменту могло устареть из-за
    /// конкурентного обновления или отмены той же брони.
    pub async fn update_booking(
        &self,
        booking_id: i64,
        customer_id: i64,
        new_quantity: i32,
    ) -> Result<Booking, ApiError> {
        if new_quantity <= 0 {
            return Err(ApiError::InvalidQuantity);
        }

        let mut tx = self.begin().await?;

        // Чужие и несуществующие брони неразличимы для клиента: NotFound
        let ticket_id: Option<i64> = sqlx::query_scalar(
            "SELECT ticket_id FROM bookings WHERE id = $1 AND customer_id = $2",
        )
        .bind(booking_id)
        .bind(customer_id)
        .fetch_optional(&mut *tx)
        .await?;
        let ticket_id = ticket_id.ok_or(ApiError::NotFound)?;

        // Порядок замков всегда одинаковый: сначала пул, потом бронь
        let availability: Option<i32> =
            sqlx::query_scalar("SELECT availability FROM tickets WHERE id = $1 FOR UPDATE")
                .bind(ticket_id)
                .fetch_optional(&mut *tx)
                .await?;
        let availability = availability.ok_or(ApiError::NotFound)?;

        // Перечитываем текущее количество под замком; бронь могла исчезнуть,
        // пока мы ждали замок пула
        let old_quantity: Option<i32> = sqlx::query_scalar(
            "SELECT quantity FROM bookings WHERE id = $1 AND customer_id = $2 FOR UPDATE",
        )
        .bind(booking_id)
        .bind(customer_id)
        .fetch_optional(&mut *tx)
        .await?;
        let old_quantity = old_quantity.ok_or(ApiError::NotFound)?;

        let delta = check_delta(availability, old_quantity, new_quantity)?;

        sqlx::query(
            "UPDATE tickets SET availability = availability - $1, updated_at = NOW()
             WHERE id = $2",
        )
        .bind(delta)
        .bind(ticket_id)
        .execute(&mut *tx)
        .await?;

        let booking: Booking =
            sqlx::query_as("UPDATE bookings SET quantity = $1 WHERE id = $2 RETURNING *")
                .bind(new_quantity)
                .bind(booking_id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        debug!(booking_id, delta, "booking updated, delta applied to pool");
        Ok(booking)
    }

    /// Отменить бронь: вернуть quantity в пул и удалить строку брони —
    /// строго вместе. Повторная отмена находит ноль строк и отдаёт NotFound
    /// без каких-либо побочных эффектов.
    pub async fn cancel_booking(&self, booking_id: i64, customer_id: i64) -> Result<(), ApiError> {
        let mut tx = self.begin().await?;

        let ticket_id: Option<i64> = sqlx::query_scalar(
            "SELECT ticket_id FROM bookings WHERE id = $1 AND customer_id = $2",
        )
        .bind(booking_id)
        .bind(customer_id)
        .fetch_optional(&mut *tx)
        .await?;
        let ticket_id = ticket_id.ok_or(ApiError::NotFound)?;

        sqlx::query("SELECT availability FROM tickets WHERE id = $1 FOR UPDATE")
            .bind(ticket_id)
            .execute(&mut *tx)
            .await?;

        let quantity: Option<i32> = sqlx::query_scalar(
            "DELETE FROM bookings WHERE id = $1 AND customer_id = $2 RETURNING quantity",
        )
        .bind(booking_id)
        .bind(customer_id)
        .fetch_optional(&mut *tx)
        .await?;
        let quantity = quantity.ok_or(ApiError::NotFound)?;

        sqlx::query(
            "UPDATE tickets SET availability = availability + $1, updated_at = NOW()
             WHERE id = $2",
        )
        .bind(quantity)
        .bind(ticket_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(booking_id, quantity, "booking cancelled, quantity reimbursed");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, ApiError> {
        let mut tx = self.db.pool.begin().await?;
        sqlx::query(SET_LOCK_TIMEOUT).execute(&mut *tx).await?;
        Ok(tx)
    }
}

/// Шаг "проверить" для создания брони. Чистая функция — вызывается уже
/// после чтения счётчика под замком.
pub(crate) fn check_reserve(availability: i32, quantity: i32) -> Result<(), ApiError> {
    if quantity <= 0 {
        return Err(ApiError::InvalidQuantity);
    }
    if quantity > availability {
        return Err(ApiError::InsufficientAvailability);
    }
    Ok(())
}

/// Шаг "проверить" для изменения брони: считает дельту и отклоняет её,
/// если списание превышает свободный остаток. Отрицательная дельта
/// (уменьшение брони) проходит всегда.
pub(crate) fn check_delta(
    availability: i32,
    old_quantity: i32,
    new_quantity: i32,
) -> Result<i32, ApiError> {
    if new_quantity <= 0 {
        return Err(ApiError::InvalidQuantity);
    }
    let delta = new_quantity - old_quantity;
    if delta > availability {
        return Err(ApiError::InsufficientAvailability);
    }
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reserve_rejects_non_positive_quantity() {
        assert!(matches!(check_reserve(10, 0), Err(ApiError::InvalidQuantity)));
        assert!(matches!(check_reserve(10, -3), Err(ApiError::InvalidQuantity)));
    }

    #[test]
    fn reserve_rejects_overdraw() {
        assert!(matches!(
            check_reserve(10, 11),
            Err(ApiError::InsufficientAvailability)
        ));
        assert!(check_reserve(10, 10).is_ok());
    }

    #[test]
    fn delta_allows_growth_only_within_free_remainder() {
        // Бронь 5 при свободных 3: рост до 8 проходит (дельта 3), до 9 — нет
        assert_eq!(check_delta(3, 5, 8).unwrap(), 3);
        assert!(matches!(
            check_delta(3, 5, 9),
            Err(ApiError::InsufficientAvailability)
        ));
    }

    #[test]
    fn shrinking_a_booking_always_passes() {
        assert_eq!(check_delta(0, 5, 1).unwrap(), -4);
    }

    proptest! {
        #[test]
        fn reserve_never_drives_availability_negative(
            availability in 0i32..=10_000,
            quantity in -100i32..=20_000,
        ) {
            match check_reserve(availability, quantity) {
                Ok(()) => {
                    prop_assert!(quantity >= 1);
                    prop_assert!(availability - quantity >= 0);
                }
                Err(ApiError::InvalidQuantity) => prop_assert!(quantity <= 0),
                Err(ApiError::InsufficientAvailability) => prop_assert!(quantity > availability),
                Err(e) => prop_assert!(false, "unexpected error: {e}"),
            }
        }

        #[test]
        fn delta_preserves_total_quantity(
            availability in 0i32..=10_000,
            old_quantity in 1i32..=10_000,
            new_quantity in -100i32..=20_000,
        ) {
            if let Ok(delta) = check_delta(availability, old_quantity, new_quantity) {
                let new_availability = availability - delta;
                prop_assert!(new_availability >= 0);
                // Сумма "в броне + в пуле" не меняется
                prop_assert_eq!(
                    old_quantity + availability,
                    new_quantity + new_availability
                );
            }
        }

        // Прогоняем произвольную последовательность операций через чистую
        // модель пула и проверяем инварианты: остаток не уходит в минус,
        // остаток + живые брони == исходная ёмкость.
        #[test]
        fn op_sequences_conserve_capacity(
            capacity in 0i32..=1_000,
            ops in proptest::collection::vec((0u8..3, 0usize..8, 1i32..=200), 0..40),
        ) {
            let mut availability = capacity;
            let mut live: Vec<i32> = Vec::new();

            for (kind, idx, qty) in ops {
                match kind {
                    0 => {
                        if check_reserve(availability, qty).is_ok() {
                            availability -= qty;
                            live.push(qty);
                        }
                    }
                    1 => {
                        if !live.is_empty() {
                            let i = idx % live.len();
                            if let Ok(delta) = check_delta(availability, live[i], qty) {
                                availability -= delta;
                                live[i] = qty;
                            }
                        }
                    }
                    _ => {
                        if !live.is_empty() {
                            let i = idx % live.len();
                            availability += live.remove(i);
                        }
                    }
                }

                prop_assert!(availability >= 0);
                let booked: i32 = live.iter().sum();
                prop_assert_eq!(availability + booked, capacity);
            }
        }
    }
}
