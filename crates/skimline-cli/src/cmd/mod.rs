pub mod count;
pub mod inspect;
pub mod run;
