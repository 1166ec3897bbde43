pub mod approval;
pub mod cancel;
pub mod run;
pub mod tool;
