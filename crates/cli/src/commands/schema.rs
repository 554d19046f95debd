//! `safeq schema`: Print the schema description.

pub fn run() {
    println!("{}", safeq_retrieval::schema_description());
}
