pub mod check;
pub mod history;
pub mod run;
pub mod watermark;
