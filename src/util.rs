pub mod cancel;
#[cfg(test)]
pub mod logs;
pub mod uri;
