//! Database repository for persons and their phone and address records.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::persons::{
        AddressDBResponse, PersonCreateDBRequest, PersonDBResponse, PersonUpdateDBRequest, PhoneDBResponse,
    },
};
use crate::types::{AddressId, PersonId, PhoneId, UserId, abbrev_uuid};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Connection, FromRow, PgConnection};
use tracing::instrument;

/// Filter for listing persons
#[derive(Debug, Clone)]
pub struct PersonFilter {
    pub skip: i64,
    pub limit: i64,
    pub search: Option<String>, // Case-insensitive substring search on first and last name
}

impl PersonFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit, search: None }
    }

    pub fn with_search(mut self, search: String) -> Self {
        self.search = Some(search);
        self
    }
}

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Person {
    pub id: PersonId,
    pub user_id: Option<UserId>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: NaiveDate,
    pub account_status: String,
    pub created_by: UserId,
    pub updated_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct Persons<'c> {
    db: &'c mut PgConnection,
}

/// Attach phone and address records to a bare person row
async fn hydrate(db: &mut PgConnection, person: Person) -> Result<PersonDBResponse> {
    let phones = sqlx::query_as::<_, PhoneDBResponse>(
        r#"
        SELECT ph.id, ph.number FROM phones ph
        JOIN person_phones pp ON pp.phone_id = ph.id
        WHERE pp.person_id = $1
        ORDER BY ph.number
        "#,
    )
    .bind(person.id)
    .fetch_all(&mut *db)
    .await?;

    let addresses = sqlx::query_as::<_, AddressDBResponse>(
        r#"
        SELECT a.id, a.address FROM addresses a
        JOIN person_addresses pa ON pa.address_id = a.id
        WHERE pa.person_id = $1
        ORDER BY a.address
        "#,
    )
    .bind(person.id)
    .fetch_all(&mut *db)
    .await?;

    Ok(PersonDBResponse {
        id: person.id,
        user_id: person.user_id,
        first_name: person.first_name,
        last_name: person.last_name,
        gender: person.gender,
        date_of_birth: person.date_of_birth,
        account_status: person.account_status,
        created_by: person.created_by,
        updated_by: person.updated_by,
        created_at: person.created_at,
        updated_at: person.updated_at,
        phones,
        addresses,
    })
}

#[async_trait::async_trait]
impl<'c> Repository for Persons<'c> {
    type CreateRequest = PersonCreateDBRequest;
    type UpdateRequest = PersonUpdateDBRequest;
    type Response = PersonDBResponse;
    type Id = PersonId;
    type Filter = PersonFilter;

    #[instrument(skip(self, request), fields(first_name = ?request.first_name, last_name = ?request.last_name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let person = sqlx::query_as::<_, Person>(
            r#"
            INSERT INTO persons (user_id, first_name, last_name, gender, date_of_birth, account_status, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.gender)
        .bind(request.date_of_birth)
        .bind(&request.account_status)
        .bind(request.created_by)
        .fetch_one(&mut *self.db)
        .await?;

        hydrate(self.db, person).await
    }

    #[instrument(skip(self), fields(person_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let person = sqlx::query_as::<_, Person>("SELECT * FROM persons WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        match person {
            Some(person) => Ok(Some(hydrate(self.db, person).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<PersonId>) -> Result<std::collections::HashMap<PersonId, PersonDBResponse>> {
        if ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }

        let persons = sqlx::query_as::<_, Person>("SELECT * FROM persons WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        let mut result = std::collections::HashMap::new();
        for person in persons {
            let id = person.id;
            result.insert(id, hydrate(self.db, person).await?);
        }

        Ok(result)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        use sqlx::QueryBuilder;

        let mut query = QueryBuilder::new("SELECT * FROM persons WHERE 1=1");

        if let Some(ref search) = filter.search {
            let search_pattern = format!("%{}%", search.to_lowercase());
            query.push(" AND (LOWER(COALESCE(first_name, '')) LIKE ");
            query.push_bind(search_pattern.clone());
            query.push(" OR LOWER(COALESCE(last_name, '')) LIKE ");
            query.push_bind(search_pattern);
            query.push(")");
        }

        query.push(" ORDER BY created_at DESC LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let persons = query.build_query_as::<Person>().fetch_all(&mut *self.db).await?;

        let mut result = Vec::new();
        for person in persons {
            result.push(hydrate(self.db, person).await?);
        }
        Ok(result)
    }

    #[instrument(skip(self), fields(person_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM persons WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(person_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        // Atomic update with conditional field updates
        let person = sqlx::query_as::<_, Person>(
            r#"
            UPDATE persons SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                gender = COALESCE($4, gender),
                date_of_birth = COALESCE($5, date_of_birth),
                account_status = COALESCE($6, account_status),
                updated_by = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.gender)
        .bind(request.date_of_birth)
        .bind(&request.account_status)
        .bind(request.updated_by)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        hydrate(self.db, person).await
    }
}

impl<'c> Persons<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_by_user_id(&mut self, user_id: UserId) -> Result<Option<PersonDBResponse>> {
        let person = sqlx::query_as::<_, Person>("SELECT * FROM persons WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&mut *self.db)
            .await?;

        match person {
            Some(person) => Ok(Some(hydrate(self.db, person).await?)),
            None => Ok(None),
        }
    }

    /// Link an account to a person. The unique constraint on user_id rejects
    /// linking the same account to a second person.
    #[instrument(skip(self), fields(person_id = %abbrev_uuid(&person_id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn link_user(&mut self, person_id: PersonId, user_id: UserId, updated_by: UserId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE persons SET user_id = $2, updated_by = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(person_id)
        .bind(user_id)
        .bind(updated_by)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() > 0 { Ok(()) } else { Err(DbError::NotFound) }
    }

    #[instrument(skip(self), fields(person_id = %abbrev_uuid(&person_id)), err)]
    pub async fn unlink_user(&mut self, person_id: PersonId, updated_by: UserId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE persons SET user_id = NULL, updated_by = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(person_id)
        .bind(updated_by)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() > 0 { Ok(()) } else { Err(DbError::NotFound) }
    }

    /// Attach a phone number, creating the shared record if it does not exist
    /// yet. Attaching an already attached number is a no-op.
    #[instrument(skip(self, number), fields(person_id = %abbrev_uuid(&person_id)), err)]
    pub async fn add_phone(&mut self, person_id: PersonId, number: &str, actor: UserId) -> Result<PhoneDBResponse> {
        let mut tx = self.db.begin().await?;

        // Get-or-create keyed on the number; the no-op update makes RETURNING
        // yield the existing row
        let phone = sqlx::query_as::<_, PhoneDBResponse>(
            r#"
            INSERT INTO phones (number, created_by, updated_by)
            VALUES ($1, $2, $2)
            ON CONFLICT (number) DO UPDATE SET number = EXCLUDED.number
            RETURNING id, number
            "#,
        )
        .bind(number)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        match sqlx::query("INSERT INTO person_phones (person_id, phone_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(person_id)
            .bind(phone.id)
            .execute(&mut *tx)
            .await
        {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                return Err(DbError::NotFound);
            }
            Err(e) => return Err(DbError::from(e)),
        }

        tx.commit().await?;
        Ok(phone)
    }

    /// Detach a phone record. Returns false when it was not attached; the
    /// shared record itself is never deleted.
    #[instrument(skip(self), fields(person_id = %abbrev_uuid(&person_id), phone_id = %abbrev_uuid(&phone_id)), err)]
    pub async fn remove_phone(&mut self, person_id: PersonId, phone_id: PhoneId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM person_phones WHERE person_id = $1 AND phone_id = $2")
            .bind(person_id)
            .bind(phone_id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Look up a phone record by its number, attached or not.
    pub async fn find_phone_by_number(&mut self, number: &str) -> Result<Option<PhoneDBResponse>> {
        let phone = sqlx::query_as::<_, PhoneDBResponse>("SELECT id, number FROM phones WHERE number = $1")
            .bind(number)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(phone)
    }

    /// Attach an address, creating the shared record if it does not exist yet.
    /// Attaching an already attached address is a no-op.
    #[instrument(skip(self, address), fields(person_id = %abbrev_uuid(&person_id)), err)]
    pub async fn add_address(&mut self, person_id: PersonId, address: &str, actor: UserId) -> Result<AddressDBResponse> {
        let mut tx = self.db.begin().await?;

        let record = sqlx::query_as::<_, AddressDBResponse>(
            r#"
            INSERT INTO addresses (address, created_by, updated_by)
            VALUES ($1, $2, $2)
            ON CONFLICT (address) DO UPDATE SET address = EXCLUDED.address
            RETURNING id, address
            "#,
        )
        .bind(address)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        match sqlx::query("INSERT INTO person_addresses (person_id, address_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(person_id)
            .bind(record.id)
            .execute(&mut *tx)
            .await
        {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                return Err(DbError::NotFound);
            }
            Err(e) => return Err(DbError::from(e)),
        }

        tx.commit().await?;
        Ok(record)
    }

    /// Detach an address record. Returns false when it was not attached; the
    /// shared record itself is never deleted.
    #[instrument(skip(self), fields(person_id = %abbrev_uuid(&person_id), address_id = %abbrev_uuid(&address_id)), err)]
    pub async fn remove_address(&mut self, person_id: PersonId, address_id: AddressId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM person_addresses WHERE person_id = $1 AND address_id = $2")
            .bind(person_id)
            .bind(address_id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Look up an address record by its value, attached or not.
    pub async fn find_address_by_value(&mut self, address: &str) -> Result<Option<AddressDBResponse>> {
        let record = sqlx::query_as::<_, AddressDBResponse>("SELECT id, address FROM addresses WHERE address = $1")
            .bind(address)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::super::repository::Repository;
    use super::*;
    use crate::db::handlers::Users;
    use crate::db::models::users::UserCreateDBRequest;
    use sqlx::PgPool;

    async fn create_test_user(conn: &mut PgConnection, username: &str) -> UserId {
        let mut users = Users::new(conn);
        users
            .create(&UserCreateDBRequest {
                username: Some(username.to_string()),
                email: Some(format!("{username}@example.com")),
                password_hash: None,
                is_active: true,
                is_staff: false,
                is_superuser: false,
            })
            .await
            .unwrap()
            .id
    }

    fn create_request(first: &str, last: &str, actor: UserId) -> PersonCreateDBRequest {
        PersonCreateDBRequest {
            user_id: None,
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            gender: Some("F".to_string()),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 12).unwrap(),
            account_status: "Incomplete".to_string(),
            created_by: actor,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_person(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let actor = create_test_user(&mut conn, "actor").await;

        let mut repo = Persons::new(&mut conn);
        let person = repo.create(&create_request("Ada", "Lovelace", actor)).await.unwrap();

        assert_eq!(person.first_name.as_deref(), Some("Ada"));
        assert_eq!(person.account_status, "Incomplete");
        assert!(person.phones.is_empty());
        assert!(person.addresses.is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_person_identity_rejected(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let actor = create_test_user(&mut conn, "actor").await;

        let mut repo = Persons::new(&mut conn);
        repo.create(&create_request("Ada", "Lovelace", actor)).await.unwrap();
        let err = repo.create(&create_request("Ada", "Lovelace", actor)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_link_user_is_one_to_one(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let actor = create_test_user(&mut conn, "actor").await;
        let account = create_test_user(&mut conn, "account").await;

        let mut repo = Persons::new(&mut conn);
        let first = repo.create(&create_request("Ada", "Lovelace", actor)).await.unwrap();
        let second = repo.create(&create_request("Grace", "Hopper", actor)).await.unwrap();

        repo.link_user(first.id, account, actor).await.unwrap();

        let found = repo.get_by_user_id(account).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);

        // Same account cannot be linked to a second person
        let err = repo.link_user(second.id, account, actor).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        repo.unlink_user(first.id, actor).await.unwrap();
        assert!(repo.get_by_user_id(account).await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_phone_records_are_shared(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let actor = create_test_user(&mut conn, "actor").await;

        let mut repo = Persons::new(&mut conn);
        let ada = repo.create(&create_request("Ada", "Lovelace", actor)).await.unwrap();
        let grace = repo.create(&create_request("Grace", "Hopper", actor)).await.unwrap();

        let phone_a = repo.add_phone(ada.id, "+14155552671", actor).await.unwrap();
        let phone_b = repo.add_phone(grace.id, "+14155552671", actor).await.unwrap();
        // Same number resolves to the same shared record
        assert_eq!(phone_a.id, phone_b.id);

        // Detaching from one person leaves the record attached to the other
        assert!(repo.remove_phone(ada.id, phone_a.id).await.unwrap());
        let grace = repo.get_by_id(grace.id).await.unwrap().unwrap();
        assert_eq!(grace.phones.len(), 1);

        // Detaching again reports not-attached
        assert!(!repo.remove_phone(ada.id, phone_a.id).await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_address_attach_detach(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let actor = create_test_user(&mut conn, "actor").await;

        let mut repo = Persons::new(&mut conn);
        let person = repo.create(&create_request("Ada", "Lovelace", actor)).await.unwrap();

        let address = repo.add_address(person.id, "12 Downing St, London", actor).await.unwrap();
        // Attaching twice is a no-op
        let again = repo.add_address(person.id, "12 Downing St, London", actor).await.unwrap();
        assert_eq!(address.id, again.id);

        let person = repo.get_by_id(person.id).await.unwrap().unwrap();
        assert_eq!(person.addresses.len(), 1);

        assert!(repo.remove_address(person.id, address.id).await.unwrap());
        assert!(!repo.remove_address(person.id, address.id).await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_add_phone_to_missing_person_is_not_found(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let actor = create_test_user(&mut conn, "actor").await;

        let mut repo = Persons::new(&mut conn);
        let err = repo.add_phone(PersonId::new_v4(), "+14155552671", actor).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }
}
