use crate::{
    auth::{hash_password, verify_password},
    entities::{
        cart_item, order, order_item, user, Address, CartItem, Order, OrderItem, PaymentMethod,
        PaymentMethodSummary, User, UserModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::UploadFile,
    storage::{AssetKind, AssetStorage},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Account management: registration, login verification, profile edits,
/// address and payment method upkeep, and the admin-only listing/deletion.
///
/// Token issuance lives in the auth module; this service only deals in user
/// rows and their owned data.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    storage: AssetStorage,
    event_sender: EventSender,
}

/// Fields required to create an account.
#[derive(Clone, Debug)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub cpf: String,
    pub password: String,
    pub confirm_password: String,
}

/// Partial profile update. A password change inside an edit still requires
/// its confirmation.
#[derive(Clone, Debug, Default)]
pub struct EditUserInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cpf: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
    pub admin: Option<bool>,
}

impl UserService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        storage: AssetStorage,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            storage,
            event_sender,
        }
    }

    /// Registers a new account. `admin` is true only for the admin-gated
    /// registration route.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(
        &self,
        input: RegisterInput,
        admin: bool,
    ) -> Result<UserModel, ServiceError> {
        let name = required(&input.name, "The name field is required")?;
        let email = required(&input.email, "The email field is required")?.to_lowercase();
        let phone = required(&input.phone, "The phone field is required")?;
        let cpf = required(&input.cpf, "The cpf field is required")?;
        if input.password.is_empty() {
            return Err(ServiceError::ValidationError(
                "The password field is required".to_string(),
            ));
        }
        if input.password != input.confirm_password {
            return Err(ServiceError::ValidationError(
                "The password and its confirmation must match".to_string(),
            ));
        }

        if User::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(&*self.db)
            .await?
            .is_some()
        {
            return Err(ServiceError::ValidationError(
                "Email already in use".to_string(),
            ));
        }
        if User::find()
            .filter(user::Column::Cpf.eq(cpf.as_str()))
            .one(&*self.db)
            .await?
            .is_some()
        {
            return Err(ServiceError::ValidationError(
                "CPF already in use".to_string(),
            ));
        }

        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let model = user::ActiveModel {
            id: Set(user_id),
            name: Set(name),
            email: Set(email),
            phone: Set(phone),
            cpf: Set(cpf),
            password_hash: Set(hash_password(&input.password)?),
            admin: Set(admin),
            image: Set(None),
            address: Set(None),
            payment_method: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::UserRegistered(user_id))
            .await;

        info!(%user_id, admin, "Registered user");
        Ok(created)
    }

    /// Verifies a login. An unknown email is a 404 with its own message;
    /// a wrong password fails validation.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<UserModel, ServiceError> {
        let email = email.trim().to_lowercase();
        let user = User::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(
                    "There is no user registered with this email".to_string(),
                )
            })?;

        if !verify_password(password, &user.password_hash)? {
            return Err(ServiceError::ValidationError("Invalid password".to_string()));
        }

        Ok(user)
    }

    pub async fn get_user(&self, id: Uuid) -> Result<UserModel, ServiceError> {
        User::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    /// All accounts, newest first. The handler gates this to admins.
    pub async fn list_users(&self) -> Result<Vec<UserModel>, ServiceError> {
        Ok(User::find()
            .order_by_desc(user::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Partial profile update; the requester must be the user themselves or
    /// an admin. Only an admin may change the admin flag. A new profile
    /// image replaces the previous one and deletes its asset.
    #[instrument(skip(self, input, image, requester), fields(requester_id = %requester.id))]
    pub async fn edit_user(
        &self,
        id: Uuid,
        input: EditUserInput,
        image: Option<UploadFile>,
        requester: &UserModel,
    ) -> Result<UserModel, ServiceError> {
        if requester.id != id && !requester.admin {
            return Err(ServiceError::Forbidden("Access denied".to_string()));
        }

        let existing = self.get_user(id).await?;

        if let Some(ref email) = input.email {
            let email = required(email, "The email field is required")?.to_lowercase();
            if User::find()
                .filter(user::Column::Email.eq(email.as_str()))
                .filter(user::Column::Id.ne(id))
                .one(&*self.db)
                .await?
                .is_some()
            {
                return Err(ServiceError::ValidationError(
                    "Email already in use".to_string(),
                ));
            }
        }
        if let Some(ref cpf) = input.cpf {
            let cpf = required(cpf, "The cpf field is required")?;
            if User::find()
                .filter(user::Column::Cpf.eq(cpf.as_str()))
                .filter(user::Column::Id.ne(id))
                .one(&*self.db)
                .await?
                .is_some()
            {
                return Err(ServiceError::ValidationError(
                    "CPF already in use".to_string(),
                ));
            }
        }
        if let Some(ref password) = input.password {
            if input.confirm_password.as_deref() != Some(password.as_str()) {
                return Err(ServiceError::ValidationError(
                    "The password and its confirmation must match".to_string(),
                ));
            }
        }
        if input.admin.is_some() && !requester.admin {
            return Err(ServiceError::Forbidden("Access denied".to_string()));
        }

        let old_image = existing.image.clone();
        let new_image = match image {
            Some(upload) => Some(
                self.storage
                    .save(AssetKind::UserImage, &upload.filename, &upload.data)
                    .await?,
            ),
            None => None,
        };

        let mut active: user::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(required(&name, "The name field is required")?);
        }
        if let Some(email) = input.email {
            active.email = Set(email.trim().to_lowercase());
        }
        if let Some(phone) = input.phone {
            active.phone = Set(required(&phone, "The phone field is required")?);
        }
        if let Some(cpf) = input.cpf {
            active.cpf = Set(cpf.trim().to_string());
        }
        if let Some(password) = input.password {
            active.password_hash = Set(hash_password(&password)?);
        }
        if let Some(admin) = input.admin {
            active.admin = Set(admin);
        }
        if let Some(ref filename) = new_image {
            active.image = Set(Some(filename.clone()));
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;

        if new_image.is_some() {
            if let Some(old) = old_image {
                self.storage.delete(AssetKind::UserImage, &old).await;
            }
        }

        self.event_sender.send_or_log(Event::UserUpdated(id)).await;

        info!(user_id = %id, "Updated user profile");
        Ok(updated)
    }

    /// Changes a password after verifying the current one. Self-or-admin.
    #[instrument(skip_all, fields(user_id = %id, requester_id = %requester.id))]
    pub async fn change_password(
        &self,
        id: Uuid,
        current: &str,
        new_password: &str,
        confirmation: &str,
        requester: &UserModel,
    ) -> Result<(), ServiceError> {
        if requester.id != id && !requester.admin {
            return Err(ServiceError::Forbidden("Access denied".to_string()));
        }

        let user = self.get_user(id).await?;

        if !verify_password(current, &user.password_hash)? {
            return Err(ServiceError::ValidationError("Invalid password".to_string()));
        }
        if new_password.is_empty() {
            return Err(ServiceError::ValidationError(
                "The password field is required".to_string(),
            ));
        }
        if new_password != confirmation {
            return Err(ServiceError::ValidationError(
                "The password and its confirmation must match".to_string(),
            ));
        }

        let mut active: user::ActiveModel = user.into();
        active.password_hash = Set(hash_password(new_password)?);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.event_sender.send_or_log(Event::UserUpdated(id)).await;
        Ok(())
    }

    /// The saved shipping address, or None when the user has not set one.
    pub async fn get_address(&self, user_id: Uuid) -> Result<Option<Address>, ServiceError> {
        Ok(self.get_user(user_id).await?.address())
    }

    #[instrument(skip(self, address))]
    pub async fn update_address(
        &self,
        user_id: Uuid,
        address: Address,
    ) -> Result<Address, ServiceError> {
        let user = self.get_user(user_id).await?;

        let mut active: user::ActiveModel = user.into();
        active.address = Set(Some(
            serde_json::to_value(&address)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?,
        ));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::UserUpdated(user_id))
            .await;
        Ok(address)
    }

    /// The saved payment method without its cvv, or None when unset.
    pub async fn get_payment_method(
        &self,
        user_id: Uuid,
    ) -> Result<Option<PaymentMethodSummary>, ServiceError> {
        Ok(self
            .get_user(user_id)
            .await?
            .payment_method()
            .map(|pm| pm.summary()))
    }

    /// Stores the full payment instrument; the response carries it without
    /// the cvv.
    #[instrument(skip(self, payment_method))]
    pub async fn update_payment_method(
        &self,
        user_id: Uuid,
        payment_method: PaymentMethod,
    ) -> Result<PaymentMethodSummary, ServiceError> {
        let user = self.get_user(user_id).await?;

        let summary = payment_method.summary();
        let mut active: user::ActiveModel = user.into();
        active.payment_method = Set(Some(
            serde_json::to_value(&payment_method)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?,
        ));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::UserUpdated(user_id))
            .await;
        Ok(summary)
    }

    /// Deletes an account with everything it owns: cart lines, orders and
    /// their lines, and the profile image asset. Admin-only at the router.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: Uuid) -> Result<(), ServiceError> {
        let user = self.get_user(id).await?;
        let image = user.image.clone();

        let txn = self.db.begin().await?;

        CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(id))
            .exec(&txn)
            .await?;

        let order_ids: Vec<Uuid> = Order::find()
            .filter(order::Column::UserId.eq(id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|o| o.id)
            .collect();
        if !order_ids.is_empty() {
            OrderItem::delete_many()
                .filter(order_item::Column::OrderId.is_in(order_ids))
                .exec(&txn)
                .await?;
            Order::delete_many()
                .filter(order::Column::UserId.eq(id))
                .exec(&txn)
                .await?;
        }

        User::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        if let Some(filename) = image {
            self.storage.delete(AssetKind::UserImage, &filename).await;
        }

        self.event_sender.send_or_log(Event::UserDeleted(id)).await;

        info!(user_id = %id, "Deleted user");
        Ok(())
    }
}

fn required(value: &str, message: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(message.to_string()));
    }
    Ok(trimmed.to_string())
}
