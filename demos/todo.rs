//! Todo list demo.
//!
//! Renders a keyed list from a store, then drives it the way a page would:
//! store writes, dispatched clicks and one frame per step.
//!
//! Run with: `cargo run --example todo`

use blixt::dom::{self, Event, NodeId};
use blixt::{Content, Store, Template, on, reactive, run_frame, template};
use serde_json::json;

fn item(todos: &Store, index: usize) -> Template {
    let todo = todos.get(index);
    let Some(todo) = todo.as_store().cloned() else {
        return template([""], vec![]);
    };
    let id = todo.get("id").as_f64().unwrap_or_default();

    let (done, title, toggle) = (todo.clone(), todo.clone(), todo.clone());
    template(
        ["<li class.done=\"", "\"><button @click=\"", "\">toggle</button> ", "</li>"],
        vec![
            reactive(move || done.get("done")),
            on(move |_| {
                let next = toggle.get("done") != blixt::Value::Bool(true);
                let _ = toggle.set("done", next);
            }),
            reactive(move || title.get("title")),
        ],
    )
    .identify(id)
}

fn app(state: &Store) -> Template {
    let (list, remaining, adder) = (state.clone(), state.clone(), state.clone());

    template(
        [
            "<section><h1>Todo</h1><p>",
            " left</p><ul>",
            "</ul><button id=\"add\" @click=\"",
            "\">add</button></section>",
        ],
        vec![
            reactive(move || {
                let todos = remaining.get("todos");
                let todos = todos.as_store().map(Store::values).unwrap_or_default();
                todos
                    .iter()
                    .filter(|todo| {
                        todo.as_store()
                            .is_some_and(|todo| todo.get("done") != blixt::Value::Bool(true))
                    })
                    .count()
            }),
            reactive(move || {
                let todos = list.get("todos");
                let Some(todos) = todos.as_store().cloned() else {
                    return Content::Empty;
                };
                (0..todos.len()).map(|index| item(&todos, index)).collect::<Vec<_>>().into()
            }),
            on(move |_| {
                let todos = adder.get("todos");
                if let Some(todos) = todos.as_store() {
                    let id = todos.len() + 1;
                    todos.push([json!({ "id": id, "title": format!("task {id}"), "done": false })]);
                }
            }),
        ],
    )
}

fn button(root: NodeId, label: &str) -> Option<NodeId> {
    dom::descendants(root)
        .into_iter()
        .filter(|node| dom::tag_name(*node).as_deref() == Some("button"))
        .find(|node| {
            dom::text_content(*node) == label
                || dom::get_attribute(*node, "id").as_deref() == Some(label)
        })
}

fn main() -> blixt::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    let state = Store::new(json!({
        "todos": [
            { "id": 1, "title": "write the store", "done": true },
            { "id": 2, "title": "write the templates", "done": false },
        ]
    }))?;

    let root = dom::create_element("main");
    app(&state).render(Some(root));
    println!("initial:   {}", dom::inner_html(root));

    if let Some(add) = button(root, "add") {
        dom::dispatch_event(add, &Event::new("click"));
    }
    run_frame();
    println!("added:     {}", dom::inner_html(root));

    if let Some(toggle) = button(root, "toggle") {
        dom::dispatch_event(toggle, &Event::new("click"));
    }
    run_frame();
    println!("toggled:   {}", dom::inner_html(root));

    if let Some(todos) = state.get("todos").as_store() {
        todos.shift();
    }
    run_frame();
    println!("shifted:   {}", dom::inner_html(root));

    Ok(())
}
