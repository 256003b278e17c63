//! Сценарии жизненного цикла брони против реального Postgres.
//!
//! Тесты помечены #[ignore]: им нужен DATABASE_URL с правами на создание
//! тестовых баз (их создаёт #[sqlx::test]). Запуск:
//!     DATABASE_URL=postgres://... cargo test --test ledger -- --ignored

use fake::faker::internet::en::SafeEmail;
use fake::Fake;
use sqlx::PgPool;

use afisha::database::Database;
use afisha::errors::ApiError;
use afisha::services::ledger::InventoryLedger;

struct Fixture {
    ledger: InventoryLedger,
    event_id: i64,
    ticket_id: i64,
    customer1: i64,
    customer2: i64,
}

async fn seed(pool: &PgPool, availability: i32) -> Fixture {
    let organizer_user: i64 = sqlx::query_scalar(
        "INSERT INTO users (email, password_hash, name, role)
         VALUES ($1, 'x', 'Organizer', 'organizer') RETURNING user_id",
    )
    .bind(SafeEmail().fake::<String>())
    .fetch_one(pool)
    .await
    .unwrap();

    let organizer_id: i64 = sqlx::query_scalar(
        "INSERT INTO organizer_profiles (user_id) VALUES ($1) RETURNING id",
    )
    .bind(organizer_user)
    .fetch_one(pool)
    .await
    .unwrap();

    let event_id: i64 = sqlx::query_scalar(
        "INSERT INTO events (organizer_id, title, venue)
         VALUES ($1, 'Test Event', 'Test Venue') RETURNING id",
    )
    .bind(organizer_id)
    .fetch_one(pool)
    .await
    .unwrap();

    let ticket_id: i64 = sqlx::query_scalar(
        "INSERT INTO tickets (event_id, ticket_type, price, availability)
         VALUES ($1, 'Standard', 10.0, $2) RETURNING id",
    )
    .bind(event_id)
    .bind(availability)
    .fetch_one(pool)
    .await
    .unwrap();

    let mut customers = Vec::new();
    for _ in 0..2 {
        let user_id: i64 = sqlx::query_scalar(
            "INSERT INTO users (email, password_hash, name, role)
             VALUES ($1, 'x', 'Customer', 'customer') RETURNING user_id",
        )
        .bind(SafeEmail().fake::<String>())
        .fetch_one(pool)
        .await
        .unwrap();

        let profile_id: i64 = sqlx::query_scalar(
            "INSERT INTO customer_profiles (user_id) VALUES ($1) RETURNING id",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap();
        customers.push(profile_id);
    }

    Fixture {
        ledger: InventoryLedger::new(Database::from_pool(pool.clone())),
        event_id,
        ticket_id,
        customer1: customers[0],
        customer2: customers[1],
    }
}

async fn availability(pool: &PgPool, ticket_id: i64) -> i32 {
    sqlx::query_scalar("SELECT availability FROM tickets WHERE id = $1")
        .bind(ticket_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "./src/migrations")]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn create_deducts_and_cancel_restores(pool: PgPool) {
    let fx = seed(&pool, 10).await;

    let booking = fx
        .ledger
        .create_booking(fx.event_id, fx.ticket_id, fx.customer1, 4)
        .await
        .unwrap();
    assert_eq!(booking.quantity, 4);
    assert_eq!(availability(&pool, fx.ticket_id).await, 6);

    fx.ledger
        .cancel_booking(booking.id, fx.customer1)
        .await
        .unwrap();
    assert_eq!(availability(&pool, fx.ticket_id).await, 10);
}

#[sqlx::test(migrations = "./src/migrations")]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn concurrent_creates_exactly_one_wins(pool: PgPool) {
    let fx = seed(&pool, 10).await;

    // 6 + 7 > 10: ровно один из конкурентных запросов должен проиграть
    let (r1, r2) = tokio::join!(
        fx.ledger
            .create_booking(fx.event_id, fx.ticket_id, fx.customer1, 6),
        fx.ledger
            .create_booking(fx.event_id, fx.ticket_id, fx.customer2, 7),
    );

    let (winner_qty, loser) = match (&r1, &r2) {
        (Ok(b), Err(e)) => (b.quantity, e),
        (Err(e), Ok(b)) => (b.quantity, e),
        other => panic!("expected exactly one success, got {:?}", other),
    };

    assert!(matches!(loser, ApiError::InsufficientAvailability));
    assert_eq!(availability(&pool, fx.ticket_id).await, 10 - winner_qty);
}

#[sqlx::test(migrations = "./src/migrations")]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn overdraw_is_rejected_without_side_effects(pool: PgPool) {
    let fx = seed(&pool, 10).await;

    let err = fx
        .ledger
        .create_booking(fx.event_id, fx.ticket_id, fx.customer1, 20)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InsufficientAvailability));
    assert_eq!(availability(&pool, fx.ticket_id).await, 10);

    let live: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(live, 0);
}

#[sqlx::test(migrations = "./src/migrations")]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn non_positive_quantity_is_rejected(pool: PgPool) {
    let fx = seed(&pool, 10).await;

    for qty in [0, -1] {
        let err = fx
            .ledger
            .create_booking(fx.event_id, fx.ticket_id, fx.customer1, qty)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidQuantity));
    }
    assert_eq!(availability(&pool, fx.ticket_id).await, 10);
}

#[sqlx::test(migrations = "./src/migrations")]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn update_grows_within_free_remainder(pool: PgPool) {
    // Ёмкость 8, бронь 5: свободно 3, рост до 8 должен пройти в ноль
    let fx = seed(&pool, 8).await;

    let booking = fx
        .ledger
        .create_booking(fx.event_id, fx.ticket_id, fx.customer1, 5)
        .await
        .unwrap();
    assert_eq!(availability(&pool, fx.ticket_id).await, 3);

    let updated = fx
        .ledger
        .update_booking(booking.id, fx.customer1, 8)
        .await
        .unwrap();
    assert_eq!(updated.quantity, 8);
    assert_eq!(availability(&pool, fx.ticket_id).await, 0);
}

#[sqlx::test(migrations = "./src/migrations")]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn update_beyond_free_remainder_fails_unchanged(pool: PgPool) {
    let fx = seed(&pool, 8).await;

    let booking = fx
        .ledger
        .create_booking(fx.event_id, fx.ticket_id, fx.customer1, 5)
        .await
        .unwrap();

    // Дельта 4 > свободных 3: отказ, и ни бронь, ни счётчик не тронуты
    let err = fx
        .ledger
        .update_booking(booking.id, fx.customer1, 9)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InsufficientAvailability));

    let quantity: i32 = sqlx::query_scalar("SELECT quantity FROM bookings WHERE id = $1")
        .bind(booking.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(quantity, 5);
    assert_eq!(availability(&pool, fx.ticket_id).await, 3);
}

#[sqlx::test(migrations = "./src/migrations")]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn shrinking_update_reimburses_pool(pool: PgPool) {
    let fx = seed(&pool, 10).await;

    let booking = fx
        .ledger
        .create_booking(fx.event_id, fx.ticket_id, fx.customer1, 6)
        .await
        .unwrap();
    assert_eq!(availability(&pool, fx.ticket_id).await, 4);

    fx.ledger
        .update_booking(booking.id, fx.customer1, 2)
        .await
        .unwrap();
    assert_eq!(availability(&pool, fx.ticket_id).await, 8);
}

#[sqlx::test(migrations = "./src/migrations")]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn second_cancel_is_not_found_and_settled(pool: PgPool) {
    let fx = seed(&pool, 10).await;

    let booking = fx
        .ledger
        .create_booking(fx.event_id, fx.ticket_id, fx.customer1, 3)
        .await
        .unwrap();

    fx.ledger
        .cancel_booking(booking.id, fx.customer1)
        .await
        .unwrap();
    assert_eq!(availability(&pool, fx.ticket_id).await, 10);

    let err = fx
        .ledger
        .cancel_booking(booking.id, fx.customer1)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound));
    assert_eq!(availability(&pool, fx.ticket_id).await, 10);
}

#[sqlx::test(migrations = "./src/migrations")]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn foreign_booking_is_masked_as_not_found(pool: PgPool) {
    let fx = seed(&pool, 10).await;

    let booking = fx
        .ledger
        .create_booking(fx.event_id, fx.ticket_id, fx.customer1, 2)
        .await
        .unwrap();

    // Чужая бронь неотличима от несуществующей
    let err = fx
        .ledger
        .update_booking(booking.id, fx.customer2, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound));

    let err = fx
        .ledger
        .cancel_booking(booking.id, fx.customer2)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound));

    assert_eq!(availability(&pool, fx.ticket_id).await, 8);

    // Владелец по-прежнему может отменить
    fx.ledger
        .cancel_booking(booking.id, fx.customer1)
        .await
        .unwrap();
    assert_eq!(availability(&pool, fx.ticket_id).await, 10);
}
