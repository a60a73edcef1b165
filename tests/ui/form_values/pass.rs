use inform::form::{FormPayload, FormValues};

#[derive(Debug, FormValues)]
struct Contact {
    email: String,
    full_name: Option<String>,
    #[form(name = "opt-in")]
    newsletter: bool,
}

fn main() {
    let payload = FormPayload::new(
        [("email", "a@inform.dev"), ("full-name", ""), ("opt-in", "on")]
            .into_iter()
            .collect(),
    );
    let contact = payload.decode::<Contact>().expect("decode contact");
    assert_eq!(contact.email, "a@inform.dev");
    assert_eq!(contact.full_name, None);
    assert!(contact.newsletter);
}
