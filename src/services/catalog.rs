use std::collections::BTreeSet;
use std::sync::Arc;

use crate::{
    db::EntityStore,
    error::{AppError, AppResult},
    models::{Director, EntityId, Film, NewFilm, NewUser, User},
    services::{ranking::RankingService, reference::ReferenceCache},
};

/// Users, films and directors: the entities the social features hang off
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn EntityStore>,
    reference: ReferenceCache,
    ranking: RankingService,
}

fn validate_user(user: &NewUser) -> AppResult<()> {
    if !user.email.contains('@') {
        return Err(AppError::Validation(format!(
            "invalid email '{}'",
            user.email
        )));
    }
    if user.login.is_empty() || user.login.chars().any(char::is_whitespace) {
        return Err(AppError::Validation(
            "login must be non-empty and contain no spaces".to_string(),
        ));
    }
    Ok(())
}

fn validate_film(film: &NewFilm) -> AppResult<()> {
    if film.name.trim().is_empty() {
        return Err(AppError::Validation("film name must not be blank".to_string()));
    }
    if film.duration == 0 {
        return Err(AppError::Validation("duration must be positive".to_string()));
    }
    Ok(())
}

impl CatalogService {
    pub fn new(store: Arc<dyn EntityStore>, reference: ReferenceCache, ranking: RankingService) -> Self {
        Self {
            store,
            reference,
            ranking,
        }
    }

    pub async fn create_user(&self, user: NewUser) -> AppResult<User> {
        validate_user(&user)?;
        let user = self.store.create_user(user).await?;
        tracing::info!(user_id = user.id, login = %user.login, "User created");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: EntityId) -> AppResult<User> {
        self.store.get_user(user_id).await
    }

    /// Resolves a set of ids to users, in id order
    pub async fn users_by_ids(&self, ids: &BTreeSet<EntityId>) -> AppResult<Vec<User>> {
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            users.push(self.store.get_user(*id).await?);
        }
        Ok(users)
    }

    pub async fn create_film(&self, film: NewFilm) -> AppResult<Film> {
        validate_film(&film)?;
        let film = self.store.create_film(film).await?;
        self.ranking.invalidate();
        tracing::info!(film_id = film.id, name = %film.name, "Film created");
        Ok(film)
    }

    pub async fn get_film(&self, film_id: EntityId) -> AppResult<Film> {
        self.store.get_film(film_id).await
    }

    pub async fn create_director(&self, name: String) -> AppResult<Director> {
        if name.trim().is_empty() {
            return Err(AppError::Validation(
                "director name must not be blank".to_string(),
            ));
        }
        let director = self.store.create_director(name).await?;
        self.reference.invalidate().await;
        tracing::info!(director_id = director.id, "Director created");
        Ok(director)
    }

    /// Films keep existing but lose the director
    pub async fn delete_director(&self, director_id: EntityId) -> AppResult<()> {
        self.store.delete_director(director_id).await?;
        self.reference.invalidate().await;
        self.ranking.invalidate();
        tracing::info!(director_id, "Director deleted");
        Ok(())
    }

    pub async fn list_directors(&self) -> AppResult<Vec<Director>> {
        self.store.list_directors().await
    }
}
