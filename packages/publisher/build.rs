fn main() {
    // Embedded migrations (sqlx::migrate!) are re-read when the schema changes
    println!("cargo:rerun-if-changed=migrations");
}
