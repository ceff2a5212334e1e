//! Contact database queries.
//!
//! CRUD operations for prospects discovered by upstream sourcing.

use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{Contact, ContactId, PriorityLevel, ValidationStatus};
use crate::storage::database::{Database, Result};

use super::parse_ts;

const CONTACT_COLUMNS: &str =
    "id, email, name, title, company, priority, validation, discovered_at";

/// Inserts a new contact.
pub async fn insert(db: &Database, contact: &Contact) -> Result<()> {
    let contact = contact.clone();

    db.with_conn(move |conn| {
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO contacts (id, email, name, title, company, priority, validation, discovered_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                contact.id.0,
                contact.email,
                contact.name,
                contact.title,
                contact.company,
                contact.priority.as_str(),
                contact.validation.as_str(),
                contact.discovered_at.to_rfc3339(),
                now,
            ],
        )?;
        Ok(())
    })
    .await
}

/// Gets a contact by ID.
pub async fn get_by_id(db: &Database, id: &ContactId) -> Result<Option<Contact>> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM contacts WHERE id = ?1",
            CONTACT_COLUMNS
        ))?;
        let result = stmt.query_row([&id.0], row_to_contact).optional()?;
        Ok(result)
    })
    .await
}

/// Gets a contact by email.
pub async fn get_by_email(db: &Database, email: &str) -> Result<Option<Contact>> {
    let email = email.to_string();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM contacts WHERE email = ?1",
            CONTACT_COLUMNS
        ))?;
        let result = stmt.query_row([&email], row_to_contact).optional()?;
        Ok(result)
    })
    .await
}

/// All contacts for a company, highest priority first, older discoveries
/// breaking ties.
pub async fn list_by_company(db: &Database, company: &str) -> Result<Vec<Contact>> {
    let company = company.to_string();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM contacts WHERE company = ?1 ORDER BY priority, discovered_at",
            CONTACT_COLUMNS
        ))?;
        let rows = stmt.query_map([&company], row_to_contact)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// All contacts, highest priority first.
pub async fn get_all(db: &Database) -> Result<Vec<Contact>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM contacts ORDER BY priority, discovered_at",
            CONTACT_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_contact)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Updates a contact's validation verdict.
pub async fn set_validation(
    db: &Database,
    id: &ContactId,
    validation: ValidationStatus,
) -> Result<()> {
    let id = id.clone();

    db.with_conn(move |conn| {
        conn.execute(
            "UPDATE contacts SET validation = ?2 WHERE id = ?1",
            params![id.0, validation.as_str()],
        )?;
        Ok(())
    })
    .await
}

/// Counts total contacts.
pub async fn count(db: &Database) -> Result<u32> {
    db.with_conn(|conn| {
        let n = conn.query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))?;
        Ok(n)
    })
    .await
}

fn row_to_contact(row: &Row<'_>) -> std::result::Result<Contact, rusqlite::Error> {
    let priority: String = row.get(5)?;
    let validation: String = row.get(6)?;
    let discovered_at: String = row.get(7)?;

    Ok(Contact {
        id: ContactId(row.get(0)?),
        email: row.get(1)?,
        name: row.get(2)?,
        title: row.get(3)?,
        company: row.get(4)?,
        priority: PriorityLevel::parse(&priority),
        validation: ValidationStatus::parse(&validation),
        discovered_at: parse_ts(&discovered_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn make_test_contact(email: &str, company: &str) -> Contact {
        Contact::new(email, company)
    }

    #[tokio::test]
    async fn insert_and_get() {
        let db = Database::open_in_memory().await.unwrap();
        let contact = make_test_contact("cto@acme.com", "Acme");

        insert(&db, &contact).await.unwrap();

        let fetched = get_by_email(&db, "cto@acme.com").await.unwrap().unwrap();
        assert_eq!(fetched.id, contact.id);
        assert_eq!(fetched.company, "Acme");
        assert_eq!(fetched.priority, PriorityLevel::P3);
        assert_eq!(fetched.validation, ValidationStatus::Valid);
    }

    #[tokio::test]
    async fn get_by_id_works() {
        let db = Database::open_in_memory().await.unwrap();
        let contact = make_test_contact("cto@acme.com", "Acme");
        insert(&db, &contact).await.unwrap();

        let fetched = get_by_id(&db, &contact.id).await.unwrap().unwrap();
        assert_eq!(fetched.email, "cto@acme.com");
    }

    #[tokio::test]
    async fn company_listing_orders_by_priority_then_age() {
        let db = Database::open_in_memory().await.unwrap();

        let mut older_p3 = make_test_contact("eng@acme.com", "Acme");
        older_p3.discovered_at = Utc::now() - Duration::days(5);
        insert(&db, &older_p3).await.unwrap();

        let mut p1 = make_test_contact("ceo@acme.com", "Acme");
        p1.priority = PriorityLevel::P1;
        insert(&db, &p1).await.unwrap();

        let newer_p3 = make_test_contact("ops@acme.com", "Acme");
        insert(&db, &newer_p3).await.unwrap();

        let other_company = make_test_contact("cto@globex.com", "Globex");
        insert(&db, &other_company).await.unwrap();

        let contacts = list_by_company(&db, "Acme").await.unwrap();
        assert_eq!(contacts.len(), 3);
        assert_eq!(contacts[0].email, "ceo@acme.com");
        assert_eq!(contacts[1].email, "eng@acme.com");
        assert_eq!(contacts[2].email, "ops@acme.com");
    }

    #[tokio::test]
    async fn validation_update() {
        let db = Database::open_in_memory().await.unwrap();
        let contact = make_test_contact("cto@acme.com", "Acme");
        insert(&db, &contact).await.unwrap();

        set_validation(&db, &contact.id, ValidationStatus::Invalid)
            .await
            .unwrap();

        let fetched = get_by_id(&db, &contact.id).await.unwrap().unwrap();
        assert_eq!(fetched.validation, ValidationStatus::Invalid);
    }

    #[tokio::test]
    async fn count_contacts() {
        let db = Database::open_in_memory().await.unwrap();
        insert(&db, &make_test_contact("a@acme.com", "Acme"))
            .await
            .unwrap();
        insert(&db, &make_test_contact("b@acme.com", "Acme"))
            .await
            .unwrap();

        assert_eq!(count(&db).await.unwrap(), 2);
    }
}
