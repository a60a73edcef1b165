#![allow(dead_code)]

#[derive(inform::form::FormValues)]
struct Wrapper<T> {
    value: T,
}

fn main() {}
