//! Read-only GraphQL surface over the same resources as the REST API.
//!
//! Served at `/graphql`: POST executes queries, GET serves the playground.
//! Queries see default-scope rows only (soft-deleted records stay hidden).

use async_graphql::{http::GraphiQLSource, Context, EmptyMutation, EmptySubscription, Object, Schema, SimpleObject, ID};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{extract::State, response::Html};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::models::pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::db::handlers::{
    mails::{MailFilter, Mails},
    users::{UserFilter, Users},
    Repository,
};
use crate::db::models::{mails::MailDBResponse, users::UserDBResponse};
use crate::AppState;

/// GraphQL context containing shared application state
pub struct GraphQLContext {
    pub db: PgPool,
}

/// The complete GraphQL schema
pub type ApiSchema = Schema<Query, EmptyMutation, EmptySubscription>;

/// Create a new GraphQL schema backed by the given pool
pub fn create_schema(db: PgPool) -> ApiSchema {
    Schema::build(Query, EmptyMutation, EmptySubscription)
        .data(GraphQLContext { db })
        .finish()
}

#[derive(Debug, Clone, SimpleObject)]
pub struct UserNode {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserDBResponse> for UserNode {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            email: db.email,
            first_name: db.first_name,
            last_name: db.last_name,
            role: format!("{:?}", db.role).to_lowercase(),
            is_active: db.is_active,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct MailNode {
    pub id: Uuid,
    pub kind: String,
    pub subject: Option<String>,
    pub to_email: Option<String>,
    pub from_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<MailDBResponse> for MailNode {
    fn from(db: MailDBResponse) -> Self {
        Self {
            id: db.id,
            kind: serde_json::to_value(db.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            subject: db.subject,
            to_email: db.to_email,
            from_email: db.from_email,
            created_at: db.created_at,
        }
    }
}

fn window(limit: Option<i32>, offset: Option<i32>) -> (i64, i64) {
    let limit = i64::from(limit.unwrap_or(DEFAULT_PAGE_SIZE as i32)).clamp(1, MAX_PAGE_SIZE);
    let offset = i64::from(offset.unwrap_or(0)).max(0);
    (limit, offset)
}

/// Root query object for GraphQL
pub struct Query;

#[Object]
impl Query {
    /// Get a user by ID
    async fn user(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<Option<UserNode>> {
        let context = ctx.data::<GraphQLContext>()?;
        let user_id = Uuid::parse_str(&id)?;

        let mut conn = context.db.acquire().await?;
        let mut repo = Users::new(&mut conn);
        let user = repo.get_by_id(user_id).await.map_err(|e| async_graphql::Error::new(e.to_string()))?;
        Ok(user.map(UserNode::from))
    }

    /// Get all users with optional pagination
    async fn users(&self, ctx: &Context<'_>, limit: Option<i32>, offset: Option<i32>) -> async_graphql::Result<Vec<UserNode>> {
        let context = ctx.data::<GraphQLContext>()?;
        let (limit, offset) = window(limit, offset);

        let mut conn = context.db.acquire().await?;
        let mut repo = Users::new(&mut conn);
        let users = repo
            .list(&UserFilter::new(offset, limit))
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))?;
        Ok(users.into_iter().map(UserNode::from).collect())
    }

    /// Get a mail record by ID
    async fn mail(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<Option<MailNode>> {
        let context = ctx.data::<GraphQLContext>()?;
        let mail_id = Uuid::parse_str(&id)?;

        let mut conn = context.db.acquire().await?;
        let mut repo = Mails::new(&mut conn);
        let mail = repo.get_by_id(mail_id).await.map_err(|e| async_graphql::Error::new(e.to_string()))?;
        Ok(mail.map(MailNode::from))
    }

    /// Get all mail records with optional pagination
    async fn mails(&self, ctx: &Context<'_>, limit: Option<i32>, offset: Option<i32>) -> async_graphql::Result<Vec<MailNode>> {
        let context = ctx.data::<GraphQLContext>()?;
        let (limit, offset) = window(limit, offset);

        let mut conn = context.db.acquire().await?;
        let mut repo = Mails::new(&mut conn);
        let mails = repo
            .list(&MailFilter::new(offset, limit))
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))?;
        Ok(mails.into_iter().map(MailNode::from).collect())
    }
}

/// POST /graphql
pub async fn graphql_handler(State(state): State<AppState>, req: GraphQLRequest) -> GraphQLResponse {
    state.graphql_schema.execute(req.into_inner()).await.into()
}

/// GET /graphql - interactive playground
pub async fn graphiql() -> Html<String> {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}
