// src/db/memory.rs
//
// In-memory repositories for service tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use chrono::Utc;

use crate::common::error::AppError;
use crate::common::pagination::PageQuery;
use crate::db::{
    NewUser, PermissionRepository, RoleRepository, SocialRepository, UserRepository, distinct_ids,
};
use crate::models::auth::{User, UserStatus};
use crate::models::rbac::{Permission, PermissionPayload, PermissionQuery, PermissionType, Role, RolePayload, RoleQuery};
use crate::models::social::{BindSocialPayload, SocialType, UserSocial};
use crate::models::user::{UpdateUserPayload, UserQuery};

#[derive(Default)]
struct State {
    next_id: i64,
    users: BTreeMap<i64, User>,
    deleted_users: BTreeSet<i64>,
    roles: BTreeMap<i64, Role>,
    deleted_roles: BTreeSet<i64>,
    permissions: BTreeMap<i64, Permission>,
    role_permissions: BTreeSet<(i64, i64)>,
    user_roles: BTreeSet<(i64, i64)>,
    socials: BTreeMap<i64, UserSocial>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn live_users(&self) -> impl Iterator<Item = &User> {
        self.users.values().filter(|u| !self.deleted_users.contains(&u.id))
    }

    fn live_roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values().filter(|r| !self.deleted_roles.contains(&r.id))
    }

    fn sync_role_permissions(&mut self, role_id: i64, ids: &[i64]) {
        self.role_permissions.retain(|(r, _)| *r != role_id);
        for id in distinct_ids(ids) {
            self.role_permissions.insert((role_id, id));
        }
    }
}

#[derive(Default)]
pub struct MemoryDb {
    state: Mutex<State>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Inserts a permission row directly, bypassing service checks.
    pub fn insert_permission(&self, parent_id: i64, code: &str, permission_type: PermissionType) -> Permission {
        self.with(|s| {
            let id = s.next_id();
            let permission = Permission {
                id,
                parent_id,
                name: code.to_string(),
                code: code.to_string(),
                permission_type,
                path: None,
                component: None,
                icon: None,
                order_num: 0,
                enabled: true,
                visible: true,
                remark: None,
                created_by: None,
                updated_by: None,
                created_at: Utc::now(),
                updated_at: None,
            };
            s.permissions.insert(id, permission.clone());
            permission
        })
    }
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.trim().to_lowercase()))
}

fn blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn paginate<T>(items: Vec<T>, page: &PageQuery) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let records = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.size() as usize)
        .collect();
    (records, total)
}

fn user_matches(state: &State, user: &User, query: &UserQuery) -> bool {
    if let Some(keyword) = query.page().keyword() {
        let hit = contains_ci(Some(&user.username), keyword)
            || contains_ci(user.nickname.as_deref(), keyword)
            || contains_ci(user.email.as_deref(), keyword)
            || contains_ci(user.phone.as_deref(), keyword);
        if !hit {
            return false;
        }
    }
    if blank(&query.username).is_some_and(|v| !contains_ci(Some(&user.username), v))
        || blank(&query.nickname).is_some_and(|v| !contains_ci(user.nickname.as_deref(), v))
        || blank(&query.email).is_some_and(|v| !contains_ci(user.email.as_deref(), v))
        || blank(&query.phone).is_some_and(|v| !contains_ci(user.phone.as_deref(), v))
    {
        return false;
    }
    query.status.is_none_or(|s| user.status == s)
        && query.gender.is_none_or(|g| user.gender == g)
        && query.role_id.is_none_or(|r| state.user_roles.contains(&(user.id, r)))
}

#[async_trait::async_trait]
impl UserRepository for MemoryDb {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.with(|s| s.live_users().find(|u| u.id == id).cloned()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self.with(|s| s.live_users().find(|u| u.username == username).cloned()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.with(|s| s.live_users().find(|u| u.email.as_deref() == Some(email)).cloned()))
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, AppError> {
        Ok(self.with(|s| s.live_users().find(|u| u.phone.as_deref() == Some(phone)).cloned()))
    }

    async fn username_exists(&self, username: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        Ok(self.with(|s| {
            s.live_users().any(|u| u.username == username && Some(u.id) != exclude_id)
        }))
    }

    async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        Ok(self.with(|s| {
            s.live_users().any(|u| u.email.as_deref() == Some(email) && Some(u.id) != exclude_id)
        }))
    }

    async fn phone_exists(&self, phone: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        Ok(self.with(|s| {
            s.live_users().any(|u| u.phone.as_deref() == Some(phone) && Some(u.id) != exclude_id)
        }))
    }

    async fn find_page(&self, query: &UserQuery) -> Result<(Vec<User>, i64), AppError> {
        let users = UserRepository::find_all(self, query).await?;
        Ok(paginate(users, &query.page()))
    }

    async fn find_all(&self, query: &UserQuery) -> Result<Vec<User>, AppError> {
        Ok(self.with(|s| {
            let s = &*s;
            s.live_users().filter(|u| user_matches(s, u, query)).cloned().collect()
        }))
    }

    async fn find_by_role(&self, role_id: i64) -> Result<Vec<User>, AppError> {
        Ok(self.with(|s| {
            s.live_users()
                .filter(|u| s.user_roles.contains(&(u.id, role_id)))
                .cloned()
                .collect()
        }))
    }

    async fn count_existing(&self, ids: &[i64]) -> Result<i64, AppError> {
        let ids = distinct_ids(ids);
        Ok(self.with(|s| s.live_users().filter(|u| ids.contains(&u.id)).count() as i64))
    }

    async fn create(&self, user: &NewUser, actor: Option<i64>) -> Result<User, AppError> {
        self.with(|s| {
            let taken = s.live_users().any(|u| {
                u.username == user.username
                    || (user.email.is_some() && u.email == user.email)
                    || (user.phone.is_some() && u.phone == user.phone)
            });
            if taken {
                return Err(AppError::conflict("Username, e-mail or phone already in use."));
            }
            let id = s.next_id();
            let now = Utc::now();
            let row = User {
                id,
                username: user.username.clone(),
                password_hash: user.password_hash.clone(),
                nickname: user.nickname.clone(),
                email: user.email.clone(),
                phone: user.phone.clone(),
                avatar: user.avatar.clone(),
                gender: user.gender,
                birthday: user.birthday,
                status: user.status,
                last_login_ip: None,
                last_login_time: None,
                login_count: 0,
                password_updated_at: Some(now),
                remark: user.remark.clone(),
                created_by: actor,
                created_at: now,
                updated_at: None,
            };
            s.users.insert(id, row.clone());
            Ok(row)
        })
    }

    async fn update(&self, id: i64, payload: &UpdateUserPayload, _actor: i64) -> Result<User, AppError> {
        self.with(|s| {
            if s.deleted_users.contains(&id) {
                return Err(AppError::not_found("User not found."));
            }
            let user = s.users.get_mut(&id).ok_or_else(|| AppError::not_found("User not found."))?;
            if let Some(v) = &payload.username {
                user.username = v.clone();
            }
            if let Some(v) = &payload.nickname {
                user.nickname = Some(v.clone());
            }
            if let Some(v) = &payload.email {
                user.email = Some(v.clone());
            }
            if let Some(v) = &payload.phone {
                user.phone = Some(v.clone());
            }
            if let Some(v) = &payload.avatar {
                user.avatar = Some(v.clone());
            }
            if let Some(v) = payload.gender {
                user.gender = v;
            }
            if let Some(v) = payload.birthday {
                user.birthday = Some(v);
            }
            if let Some(v) = &payload.remark {
                user.remark = Some(v.clone());
            }
            user.updated_at = Some(Utc::now());
            Ok(user.clone())
        })
    }

    async fn delete(&self, ids: &[i64], _actor: i64) -> Result<u64, AppError> {
        Ok(self.with(|s| {
            let mut affected = 0;
            for id in distinct_ids(ids) {
                if s.users.contains_key(&id) && s.deleted_users.insert(id) {
                    affected += 1;
                }
                s.user_roles.retain(|(u, _)| *u != id);
            }
            affected
        }))
    }

    async fn update_status(&self, ids: &[i64], status: UserStatus, _actor: i64) -> Result<u64, AppError> {
        Ok(self.with(|s| {
            let ids = distinct_ids(ids);
            let mut affected = 0;
            for (id, user) in s.users.iter_mut() {
                if ids.contains(id) && !s.deleted_users.contains(id) {
                    user.status = status;
                    affected += 1;
                }
            }
            affected
        }))
    }

    async fn update_password(&self, id: i64, password_hash: &str, _actor: i64) -> Result<(), AppError> {
        self.with(|s| {
            if s.deleted_users.contains(&id) {
                return Err(AppError::not_found("User not found."));
            }
            let user = s.users.get_mut(&id).ok_or_else(|| AppError::not_found("User not found."))?;
            user.password_hash = password_hash.to_string();
            user.password_updated_at = Some(Utc::now());
            Ok(())
        })
    }

    async fn record_login(&self, id: i64, ip: Option<&str>) -> Result<(), AppError> {
        self.with(|s| {
            if let Some(user) = s.users.get_mut(&id) {
                user.last_login_ip = ip.map(str::to_string);
                user.last_login_time = Some(Utc::now());
                user.login_count += 1;
            }
        });
        Ok(())
    }
}

#[async_trait::async_trait]
impl RoleRepository for MemoryDb {
    async fn find_by_id(&self, id: i64) -> Result<Option<Role>, AppError> {
        Ok(self.with(|s| s.live_roles().find(|r| r.id == id).cloned()))
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Role>, AppError> {
        Ok(self.with(|s| s.live_roles().find(|r| r.code == code).cloned()))
    }

    async fn find_page(&self, query: &RoleQuery) -> Result<(Vec<Role>, i64), AppError> {
        let roles: Vec<Role> = self.with(|s| {
            s.live_roles()
                .filter(|r| blank(&query.name).is_none_or(|v| contains_ci(Some(&r.name), v)))
                .filter(|r| blank(&query.code).is_none_or(|v| contains_ci(Some(&r.code), v)))
                .filter(|r| query.enabled.is_none_or(|e| r.enabled == e))
                .filter(|r| query.data_scope.is_none_or(|d| r.data_scope == d))
                .cloned()
                .collect()
        });
        Ok(paginate(roles, &query.page()))
    }

    async fn find_enabled(&self) -> Result<Vec<Role>, AppError> {
        Ok(self.with(|s| s.live_roles().filter(|r| r.enabled).cloned().collect()))
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<Role>, AppError> {
        Ok(self.with(|s| {
            s.live_roles()
                .filter(|r| s.user_roles.contains(&(user_id, r.id)))
                .cloned()
                .collect()
        }))
    }

    async fn code_exists(&self, code: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        Ok(self.with(|s| s.live_roles().any(|r| r.code == code && Some(r.id) != exclude_id)))
    }

    async fn name_exists(&self, name: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        Ok(self.with(|s| s.live_roles().any(|r| r.name == name && Some(r.id) != exclude_id)))
    }

    async fn count_existing(&self, ids: &[i64]) -> Result<i64, AppError> {
        let ids = distinct_ids(ids);
        Ok(self.with(|s| s.live_roles().filter(|r| ids.contains(&r.id)).count() as i64))
    }

    async fn count_users(&self, role_id: i64) -> Result<i64, AppError> {
        Ok(self.with(|s| {
            s.user_roles
                .iter()
                .filter(|(u, r)| *r == role_id && !s.deleted_users.contains(u))
                .count() as i64
        }))
    }

    async fn create(&self, payload: &RolePayload, actor: i64) -> Result<Role, AppError> {
        Ok(self.with(|s| {
            let id = s.next_id();
            let role = Role {
                id,
                name: payload.name.clone(),
                code: payload.code.clone(),
                sort_order: payload.sort_order,
                data_scope: payload.data_scope,
                enabled: true,
                remark: payload.remark.clone(),
                created_by: Some(actor),
                updated_by: None,
                created_at: Utc::now(),
                updated_at: None,
            };
            s.roles.insert(id, role.clone());
            if let Some(ids) = &payload.permission_ids {
                s.sync_role_permissions(id, ids);
            }
            role
        }))
    }

    async fn update(&self, id: i64, payload: &RolePayload, actor: i64) -> Result<Role, AppError> {
        self.with(|s| {
            if s.deleted_roles.contains(&id) {
                return Err(AppError::not_found("Role not found."));
            }
            let role = s.roles.get_mut(&id).ok_or_else(|| AppError::not_found("Role not found."))?;
            role.name = payload.name.clone();
            role.code = payload.code.clone();
            role.sort_order = payload.sort_order;
            role.data_scope = payload.data_scope;
            role.remark = payload.remark.clone();
            role.updated_by = Some(actor);
            role.updated_at = Some(Utc::now());
            let role = role.clone();
            if let Some(ids) = &payload.permission_ids {
                s.sync_role_permissions(id, ids);
            }
            Ok(role)
        })
    }

    async fn delete(&self, id: i64, _actor: i64) -> Result<(), AppError> {
        self.with(|s| {
            s.deleted_roles.insert(id);
            s.role_permissions.retain(|(r, _)| *r != id);
            s.user_roles.retain(|(_, r)| *r != id);
        });
        Ok(())
    }

    async fn update_status(&self, ids: &[i64], enabled: bool, _actor: i64) -> Result<u64, AppError> {
        Ok(self.with(|s| {
            let ids = distinct_ids(ids);
            let mut affected = 0;
            for (id, role) in s.roles.iter_mut() {
                if ids.contains(id) && !s.deleted_roles.contains(id) {
                    role.enabled = enabled;
                    affected += 1;
                }
            }
            affected
        }))
    }

    async fn permission_ids(&self, role_id: i64) -> Result<Vec<i64>, AppError> {
        Ok(self.with(|s| {
            s.role_permissions
                .iter()
                .filter(|(r, _)| *r == role_id)
                .map(|(_, p)| *p)
                .collect()
        }))
    }

    async fn replace_permissions(&self, role_id: i64, permission_ids: &[i64], _actor: i64) -> Result<(), AppError> {
        self.with(|s| s.sync_role_permissions(role_id, permission_ids));
        Ok(())
    }

    async fn role_ids_for_user(&self, user_id: i64) -> Result<Vec<i64>, AppError> {
        Ok(self.with(|s| {
            s.user_roles
                .iter()
                .filter(|(u, r)| *u == user_id && !s.deleted_roles.contains(r))
                .map(|(_, r)| *r)
                .collect()
        }))
    }

    async fn replace_user_roles(&self, user_id: i64, role_ids: &[i64], _actor: i64) -> Result<(), AppError> {
        self.with(|s| {
            s.user_roles.retain(|(u, _)| *u != user_id);
            for id in distinct_ids(role_ids) {
                s.user_roles.insert((user_id, id));
            }
        });
        Ok(())
    }
}

fn permission_matches(p: &Permission, query: &PermissionQuery) -> bool {
    blank(&query.name).is_none_or(|v| contains_ci(Some(&p.name), v))
        && blank(&query.code).is_none_or(|v| contains_ci(Some(&p.code), v))
        && query.permission_type.is_none_or(|t| p.permission_type == t)
        && query.enabled.is_none_or(|e| p.enabled == e)
        && query.visible.is_none_or(|v| p.visible == v)
        && query.parent_id.is_none_or(|id| p.parent_id == id)
}

fn sorted(mut permissions: Vec<Permission>) -> Vec<Permission> {
    permissions.sort_by_key(|p| (p.parent_id, p.order_num, p.id));
    permissions
}

#[async_trait::async_trait]
impl PermissionRepository for MemoryDb {
    async fn find_by_id(&self, id: i64) -> Result<Option<Permission>, AppError> {
        Ok(self.with(|s| s.permissions.get(&id).cloned()))
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Permission>, AppError> {
        Ok(self.with(|s| s.permissions.values().find(|p| p.code == code).cloned()))
    }

    async fn find_all(&self) -> Result<Vec<Permission>, AppError> {
        Ok(sorted(self.with(|s| s.permissions.values().cloned().collect())))
    }

    async fn find_page(&self, query: &PermissionQuery) -> Result<(Vec<Permission>, i64), AppError> {
        let permissions = self.with(|s| {
            s.permissions.values().filter(|p| permission_matches(p, query)).cloned().collect()
        });
        Ok(paginate(sorted(permissions), &query.page()))
    }

    async fn find_by_type(&self, permission_type: PermissionType) -> Result<Vec<Permission>, AppError> {
        Ok(sorted(self.with(|s| {
            s.permissions
                .values()
                .filter(|p| p.permission_type == permission_type && p.enabled)
                .cloned()
                .collect()
        })))
    }

    async fn find_by_role(&self, role_id: i64) -> Result<Vec<Permission>, AppError> {
        Ok(sorted(self.with(|s| {
            s.permissions
                .values()
                .filter(|p| s.role_permissions.contains(&(role_id, p.id)))
                .cloned()
                .collect()
        })))
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<Permission>, AppError> {
        Ok(sorted(self.with(|s| {
            let roles: BTreeSet<i64> = s
                .user_roles
                .iter()
                .filter(|(u, _)| *u == user_id)
                .map(|(_, r)| *r)
                .filter(|r| s.live_roles().any(|role| role.id == *r && role.enabled))
                .collect();
            s.permissions
                .values()
                .filter(|p| p.enabled)
                .filter(|p| roles.iter().any(|r| s.role_permissions.contains(&(*r, p.id))))
                .cloned()
                .collect()
        })))
    }

    async fn code_exists(&self, code: &str, exclude_id: Option<i64>) -> Result<bool, AppError> {
        Ok(self.with(|s| s.permissions.values().any(|p| p.code == code && Some(p.id) != exclude_id)))
    }

    async fn count_children(&self, id: i64) -> Result<i64, AppError> {
        Ok(self.with(|s| s.permissions.values().filter(|p| p.parent_id == id).count() as i64))
    }

    async fn count_existing(&self, ids: &[i64]) -> Result<i64, AppError> {
        let ids = distinct_ids(ids);
        Ok(self.with(|s| ids.iter().filter(|id| s.permissions.contains_key(id)).count() as i64))
    }

    async fn create(&self, payload: &PermissionPayload, actor: i64) -> Result<Permission, AppError> {
        Ok(self.with(|s| {
            let id = s.next_id();
            let permission = Permission {
                id,
                parent_id: payload.parent_id,
                name: payload.name.clone(),
                code: payload.code.clone(),
                permission_type: payload.permission_type,
                path: payload.path.clone(),
                component: payload.component.clone(),
                icon: payload.icon.clone(),
                order_num: payload.order_num,
                enabled: true,
                visible: payload.visible.unwrap_or(true),
                remark: payload.remark.clone(),
                created_by: Some(actor),
                updated_by: None,
                created_at: Utc::now(),
                updated_at: None,
            };
            s.permissions.insert(id, permission.clone());
            permission
        }))
    }

    async fn update(&self, id: i64, payload: &PermissionPayload, actor: i64) -> Result<Permission, AppError> {
        self.with(|s| {
            let p = s.permissions.get_mut(&id).ok_or_else(|| AppError::not_found("Permission not found."))?;
            p.parent_id = payload.parent_id;
            p.name = payload.name.clone();
            p.code = payload.code.clone();
            p.permission_type = payload.permission_type;
            p.path = payload.path.clone();
            p.component = payload.component.clone();
            p.icon = payload.icon.clone();
            p.order_num = payload.order_num;
            if let Some(visible) = payload.visible {
                p.visible = visible;
            }
            p.remark = payload.remark.clone();
            p.updated_by = Some(actor);
            p.updated_at = Some(Utc::now());
            Ok(p.clone())
        })
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        self.with(|s| {
            s.role_permissions.retain(|(_, p)| *p != id);
            s.permissions.remove(&id);
        });
        Ok(())
    }

    async fn update_status(&self, ids: &[i64], enabled: bool, _actor: i64) -> Result<u64, AppError> {
        Ok(self.with(|s| {
            let mut affected = 0;
            for id in distinct_ids(ids) {
                if let Some(p) = s.permissions.get_mut(&id) {
                    p.enabled = enabled;
                    affected += 1;
                }
            }
            affected
        }))
    }
}

#[async_trait::async_trait]
impl SocialRepository for MemoryDb {
    async fn find_by_social(&self, social_type: SocialType, social_id: &str) -> Result<Option<UserSocial>, AppError> {
        Ok(self.with(|s| {
            s.socials
                .values()
                .find(|b| b.social_type == social_type && b.social_id == social_id)
                .cloned()
        }))
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<UserSocial>, AppError> {
        Ok(self.with(|s| s.socials.values().filter(|b| b.user_id == user_id).cloned().collect()))
    }

    async fn create(&self, user_id: i64, payload: &BindSocialPayload) -> Result<UserSocial, AppError> {
        Ok(self.with(|s| {
            let id = s.next_id();
            let social = UserSocial {
                id,
                user_id,
                social_type: payload.social_type,
                social_id: payload.social_id.clone(),
                social_nickname: payload.social_nickname.clone(),
                social_avatar: payload.social_avatar.clone(),
                social_email: payload.social_email.clone(),
                union_id: payload.union_id.clone(),
                open_id: payload.open_id.clone(),
                expires_in: payload.expires_in,
                bind_time: Utc::now(),
                last_login_time: None,
                login_count: 0,
            };
            s.socials.insert(id, social.clone());
            social
        }))
    }

    async fn delete(&self, user_id: i64, social_type: SocialType) -> Result<bool, AppError> {
        Ok(self.with(|s| {
            let before = s.socials.len();
            s.socials.retain(|_, b| !(b.user_id == user_id && b.social_type == social_type));
            s.socials.len() < before
        }))
    }

    async fn record_login(&self, id: i64) -> Result<(), AppError> {
        self.with(|s| {
            if let Some(b) = s.socials.get_mut(&id) {
                b.last_login_time = Some(Utc::now());
                b.login_count += 1;
            }
        });
        Ok(())
    }
}
