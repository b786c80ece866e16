pub mod cart;
pub mod catalog;
pub mod orders;
pub mod users;

pub use cart::CartService;
pub use catalog::CatalogService;
pub use orders::OrderService;
pub use users::UserService;

/// An uploaded file as received from a multipart request: the client-supplied
/// filename (only its extension is trusted) and the raw bytes.
#[derive(Clone, Debug)]
pub struct UploadFile {
    pub filename: String,
    pub data: Vec<u8>,
}
