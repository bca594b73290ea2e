use super::ast::Prototype;
use super::backend::Interp;

/// Standard library visible to language programs: a character-output
/// primitive and a formatted-number-output primitive. Both take one scalar
/// and return the neutral 0.0.
pub fn install(backend: &mut Interp) {
    backend.register_native("putchard", |args| {
        let x = args.first().copied().unwrap_or(0.0);
        unsafe {
            libc::putchar(x as libc::c_int);
        }
        0.0
    });
    backend.register_native("printd", |args| {
        let x = args.first().copied().unwrap_or(0.0);
        println!("{}", x);
        0.0
    });
}

/// Signatures for the primitives, seeded into the prototype cache so
/// programs can call them without writing an `extern` first.
pub fn prototypes() -> Vec<Prototype> {
    vec![
        Prototype::new("putchard", vec!["x".to_owned()]),
        Prototype::new("printd", vec!["x".to_owned()]),
    ]
}
