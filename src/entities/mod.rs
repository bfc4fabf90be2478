pub mod company;
pub mod contact;
pub mod user;

pub use company::Entity as Company;
pub use contact::Entity as Contact;
pub use user::Entity as User;
