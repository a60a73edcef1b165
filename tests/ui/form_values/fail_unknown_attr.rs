#![allow(dead_code)]

#[derive(inform::form::FormValues)]
struct Contact {
    #[form(rename = "e-mail")]
    email: String,
}

fn main() {}
