//! Member directory and account removal

use crate::error::{messages, ApiError, ApiResult};
use crate::repositories::IdentityStore;
use chrono::Utc;
use rolegate_shared::{MemberFilters, MemberSummary, MembersPage, SessionPayload, DEFAULT_MEMBER_ROLE};
use std::sync::Arc;
use tracing::{info, instrument};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

pub struct MemberService {
    identities: Arc<dyn IdentityStore>,
}

impl MemberService {
    pub fn new(identities: Arc<dyn IdentityStore>) -> Self {
        Self { identities }
    }

    /// Page through the live members of one role, ordered by member code
    #[instrument(skip(self))]
    pub async fn list_members(&self, filters: MemberFilters) -> ApiResult<MembersPage> {
        let role = filters
            .role
            .filter(|role| !role.is_empty())
            .unwrap_or_else(|| DEFAULT_MEMBER_ROLE.to_string());
        let per_page = filters
            .limit
            .and_then(|limit| limit.parse::<u32>().ok())
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let page = parse_page(filters.page.as_deref())?;

        let (total_data, identities) = self.identities.list_by_role(&role, page, per_page).await?;
        let data = identities
            .iter()
            .map(|identity| MemberSummary {
                code: identity.code.clone(),
                email: identity.email.clone(),
                name: identity
                    .membership(&role)
                    .map(|m| m.display_name().to_string())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(MembersPage {
            data,
            total_data,
            page,
            per_page,
        })
    }

    /// Soft-delete the identity behind the session
    #[instrument(skip(self), fields(email = %session.email))]
    pub async fn delete_account(&self, session: &SessionPayload) -> ApiResult<()> {
        if !self.identities.soft_delete(&session.email, Utc::now()).await? {
            return Err(ApiError::not_found(messages::USER_NOT_FOUND));
        }
        info!("Account deleted");
        Ok(())
    }
}

/// Missing or non-numeric pages fall back to the first page; numbers that are
/// not natural are refused.
fn parse_page(raw: Option<&str>) -> ApiResult<u32> {
    let Some(page) = raw.and_then(|raw| raw.trim().parse::<f64>().ok()) else {
        return Ok(1);
    };
    if page < 1.0 || page.fract() != 0.0 || page > f64::from(u32::MAX) {
        return Err(ApiError::bad_request(messages::PAGE_NOT_NATURAL));
    }
    Ok(page as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryIdentityStore;
    use rolegate_shared::{AttributeBag, Identity, RoleMembership};
    use rstest::rstest;

    fn identity(code: &str, email: &str, role: &str) -> Identity {
        let now = Utc::now();
        let mut additions = AttributeBag::new();
        additions.set("name", format!("Member {code}"));
        Identity {
            code: code.into(),
            email: email.into(),
            verify_email_token: None,
            roles: vec![RoleMembership {
                name: role.into(),
                additions,
            }],
            created_at: now,
            updated_at: now,
            deleted_at: None,
            expires_at: None,
        }
    }

    async fn service() -> MemberService {
        let store = Arc::new(MemoryIdentityStore::default());
        for n in 0..12 {
            store
                .save(&identity(&format!("M{n:06}"), &format!("u{n}@x.io"), "user"))
                .await
                .unwrap();
        }
        store.save(&identity("M000099", "s@x.io", "staff")).await.unwrap();
        MemberService::new(store)
    }

    #[rstest]
    #[case(None, Ok(1))]
    #[case(Some("abc"), Ok(1))]
    #[case(Some("3"), Ok(3))]
    #[case(Some("2.0"), Ok(2))]
    #[case(Some("0"), Err(()))]
    #[case(Some("-4"), Err(()))]
    #[case(Some("1.5"), Err(()))]
    fn test_parse_page(#[case] raw: Option<&str>, #[case] expected: Result<u32, ()>) {
        assert_eq!(parse_page(raw).map_err(|_| ()), expected);
    }

    #[tokio::test]
    async fn test_list_defaults_to_user_role() {
        let members = service().await;
        let page = members.list_members(MemberFilters::default()).await.unwrap();

        assert_eq!(page.total_data, 12);
        assert_eq!(page.per_page, DEFAULT_PAGE_SIZE);
        assert_eq!(page.data.len(), 10);
        assert_eq!(page.data[0].name, "Member M000000");
    }

    #[tokio::test]
    async fn test_list_second_page_with_bad_limit() {
        let members = service().await;
        let page = members
            .list_members(MemberFilters {
                role: None,
                page: Some("2".into()),
                limit: Some("lots".into()),
            })
            .await
            .unwrap();

        assert_eq!(page.page, 2);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0].code, "M000010");
    }

    #[tokio::test]
    async fn test_delete_account_hides_member() {
        let members = service().await;
        let session = SessionPayload {
            email: "s@x.io".into(),
            role: "staff".into(),
        };

        members.delete_account(&session).await.unwrap();
        let filters = MemberFilters {
            role: Some("staff".into()),
            ..Default::default()
        };
        assert_eq!(members.list_members(filters).await.unwrap().total_data, 0);
        assert!(matches!(
            members.delete_account(&session).await.unwrap_err(),
            ApiError::NotFound(_)
        ));
    }
}
