#![allow(dead_code)]

#[derive(inform::form::FormValues)]
enum Choice {
    Yes,
    No,
}

fn main() {}
