use super::{now, Database, Profile};
use crate::error::{is_unique_violation, AppError};
use shared::{Role, Subject};
use sqlx::types::Json;

pub struct NewProfile {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub hourly_rate: Option<f64>,
    pub specialties: Vec<Subject>,
    pub struggles: Vec<Subject>,
    pub bio: Option<String>,
}

/// Partial profile update. Absent fields are left untouched; `role` is
/// deliberately not here — it never changes after creation.
#[derive(Default)]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub hourly_rate: Option<f64>,
    pub specialties: Option<Vec<Subject>>,
    pub struggles: Option<Vec<Subject>>,
    pub bio: Option<String>,
}

impl Database {
    pub async fn create_profile(&self, new: NewProfile) -> Result<Profile, AppError> {
        let timestamp = now();
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO profiles
                (user_id, username, role, email, hourly_rate, specialties, struggles, bio, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.user_id)
        .bind(&new.username)
        .bind(new.role.as_str())
        .bind(&new.email)
        .bind(new.hourly_rate)
        .bind(Json(&new.specialties))
        .bind(Json(&new.struggles))
        .bind(&new.bio)
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&mut *tx)
        .await
        .map_err(map_profile_unique)?;

        if new.role == Role::Tutor {
            for subject in &new.specialties {
                sqlx::query("INSERT INTO tutor_subjects (tutor_id, subject) VALUES (?, ?)")
                    .bind(&new.user_id)
                    .bind(subject.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        Ok(Profile {
            user_id: new.user_id,
            username: new.username,
            role: new.role.to_string(),
            email: new.email,
            hourly_rate: new.hourly_rate,
            specialties: Json(new.specialties),
            struggles: Json(new.struggles),
            bio: new.bio,
            created_at: timestamp.clone(),
            updated_at: timestamp,
        })
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(profile)
    }

    pub(crate) async fn require_profile(&self, user_id: &str) -> Result<Profile, AppError> {
        self.get_profile(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))
    }

    /// Applies the patch and, when `specialties` changes on a tutor, brings
    /// `tutor_subjects` to exactly the new set in the same transaction.
    pub async fn update_profile(
        &self,
        user_id: &str,
        patch: ProfilePatch,
    ) -> Result<Profile, AppError> {
        let mut tx = self.pool().begin().await?;

        let current = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

        let username = patch.username.unwrap_or_else(|| current.username.clone());
        let hourly_rate = patch.hourly_rate.or(current.hourly_rate);
        let specialties = patch
            .specialties
            .clone()
            .map(Json)
            .unwrap_or_else(|| current.specialties.clone());
        let struggles = patch
            .struggles
            .map(Json)
            .unwrap_or_else(|| current.struggles.clone());
        let bio = patch.bio.or_else(|| current.bio.clone());
        let timestamp = now();

        sqlx::query(
            r#"
            UPDATE profiles
            SET username = ?, hourly_rate = ?, specialties = ?, struggles = ?, bio = ?, updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(&username)
        .bind(hourly_rate)
        .bind(&specialties)
        .bind(&struggles)
        .bind(&bio)
        .bind(&timestamp)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(map_profile_unique)?;

        if let Some(new_set) = &patch.specialties {
            if current.role == Role::Tutor.as_str() {
                let registered: Vec<String> =
                    sqlx::query_scalar("SELECT subject FROM tutor_subjects WHERE tutor_id = ?")
                        .bind(user_id)
                        .fetch_all(&mut *tx)
                        .await?;

                for subject in &registered {
                    if !new_set.iter().any(|s| s.as_str() == subject) {
                        sqlx::query(
                            "DELETE FROM tutor_subjects WHERE tutor_id = ? AND subject = ?",
                        )
                        .bind(user_id)
                        .bind(subject)
                        .execute(&mut *tx)
                        .await?;
                    }
                }
                for subject in new_set {
                    if !registered.iter().any(|s| s == subject.as_str()) {
                        sqlx::query(
                            "INSERT INTO tutor_subjects (tutor_id, subject) VALUES (?, ?)",
                        )
                        .bind(user_id)
                        .bind(subject.as_str())
                        .execute(&mut *tx)
                        .await?;
                    }
                }
            }
        }

        tx.commit().await?;

        Ok(Profile {
            user_id: user_id.to_string(),
            username,
            role: current.role,
            email: current.email,
            hourly_rate,
            specialties,
            struggles,
            bio,
            created_at: current.created_at,
            updated_at: timestamp,
        })
    }

    pub async fn search_users(
        &self,
        query: &str,
        role: Option<Role>,
    ) -> Result<Vec<Profile>, AppError> {
        let pattern = format!("%{query}%");
        let profiles = match role {
            Some(role) => {
                sqlx::query_as::<_, Profile>(
                    "SELECT * FROM profiles WHERE username LIKE ? AND role = ? ORDER BY username",
                )
                .bind(&pattern)
                .bind(role.as_str())
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, Profile>(
                    "SELECT * FROM profiles WHERE username LIKE ? ORDER BY username",
                )
                .bind(&pattern)
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(profiles)
    }

    pub async fn get_tutor_subjects(&self, tutor_id: &str) -> Result<Vec<String>, AppError> {
        let subjects: Vec<String> = sqlx::query_scalar(
            "SELECT subject FROM tutor_subjects WHERE tutor_id = ? ORDER BY subject",
        )
        .bind(tutor_id)
        .fetch_all(self.pool())
        .await?;
        Ok(subjects)
    }

    pub async fn get_profile_by_email(&self, email: &str) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE email = ?")
            .bind(email)
            .fetch_optional(self.pool())
            .await?;
        Ok(profile)
    }
}

/// The store reports both duplicate usernames and duplicate profiles as
/// UNIQUE violations; the constraint name is the only way to tell them apart.
fn map_profile_unique(err: sqlx::Error) -> AppError {
    if is_unique_violation(&err) {
        let message = err
            .as_database_error()
            .map(|e| e.message().to_string())
            .unwrap_or_default();
        if message.contains("profiles.username") {
            return AppError::Conflict("Username already taken".to_string());
        }
        return AppError::Conflict("Profile already exists".to_string());
    }
    AppError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::super::testing::{account, mem_db, tutor_with_subjects};
    use super::*;
    use shared::Role;

    #[tokio::test]
    async fn test_create_and_get_profile() {
        let db = mem_db().await;
        let created = account(&db, "ada", Role::Student).await;

        let fetched = db.get_profile(&created.user_id).await.unwrap().unwrap();
        assert_eq!(fetched.username, "ada");
        assert_eq!(fetched.role, "student");
        assert!(fetched.specialties.0.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let db = mem_db().await;
        account(&db, "ada", Role::Student).await;

        let other = account(&db, "grace", Role::Student).await;
        let err = db
            .update_profile(
                &other.user_id,
                ProfilePatch {
                    username: Some("ada".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_specialty_sync_matches_new_set_exactly() {
        let db = mem_db().await;
        let tutor =
            tutor_with_subjects(&db, "turing", &[Subject::Math, Subject::Science]).await;
        assert_eq!(
            db.get_tutor_subjects(&tutor.user_id).await.unwrap(),
            vec!["Math".to_string(), "Science".to_string()]
        );

        // Replace Science with Computer Science; Math survives untouched
        db.update_profile(
            &tutor.user_id,
            ProfilePatch {
                specialties: Some(vec![Subject::Math, Subject::ComputerScience]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(
            db.get_tutor_subjects(&tutor.user_id).await.unwrap(),
            vec!["Computer Science".to_string(), "Math".to_string()]
        );
    }

    #[tokio::test]
    async fn test_specialty_sync_skipped_for_students() {
        let db = mem_db().await;
        let student = account(&db, "ada", Role::Student).await;

        db.update_profile(
            &student.user_id,
            ProfilePatch {
                specialties: Some(vec![Subject::Math]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(db
            .get_tutor_subjects(&student.user_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_patch_leaves_absent_fields_alone() {
        let db = mem_db().await;
        let tutor = account(&db, "turing", Role::Tutor).await;

        db.update_profile(
            &tutor.user_id,
            ProfilePatch {
                hourly_rate: Some(40.0),
                bio: Some("hi".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let updated = db
            .update_profile(
                &tutor.user_id,
                ProfilePatch {
                    username: Some("alan".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.username, "alan");
        assert_eq!(updated.hourly_rate, Some(40.0));
        assert_eq!(updated.bio.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_search_users_filters_by_role() {
        let db = mem_db().await;
        account(&db, "ada-student", Role::Student).await;
        account(&db, "ada-tutor", Role::Tutor).await;
        account(&db, "grace", Role::Student).await;

        let all = db.search_users("ada", None).await.unwrap();
        assert_eq!(all.len(), 2);

        let tutors = db.search_users("ada", Some(Role::Tutor)).await.unwrap();
        assert_eq!(tutors.len(), 1);
        assert_eq!(tutors[0].username, "ada-tutor");
    }

    #[tokio::test]
    async fn test_update_missing_profile_is_not_found() {
        let db = mem_db().await;
        let err = db
            .update_profile("nope", ProfilePatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
