use std::cell::RefCell;
use std::rc::Rc;

use idom_core::{
    call, print, render_element, with_log_region, ContentKind, DelegateRegistry, Element,
    ElementHandle, KeySegment, Logger, MemoryPatcher, PatchError, Renderer, SanitizedContent,
    Template, TemplateRuntime, TemplateValue, VisualElement,
};

#[derive(Debug, Clone, PartialEq)]
struct Todo {
    title: String,
    done: bool,
}

impl Todo {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_owned(),
            done: false,
        }
    }
}

/// One row of the list. Remembers how often it was actually rendered.
#[derive(Default)]
struct TodoRow {
    renders: usize,
}

impl Element for TodoRow {
    type Data = Todo;
    const TAG: &'static str = "li";

    fn render(&mut self, renderer: &mut dyn Renderer, todo: &Todo) {
        self.renders += 1;
        if todo.done {
            renderer.attr("class", "done");
        }
        renderer.apply_attrs();
        renderer.text(&todo.title);
    }
}

/// Forwards logging regions to the `log` facade.
struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn enter(&self, element: &VisualElement, logonly: bool) {
        log::info!("enter ve {} ({}) logonly={logonly}", element.id, element.name);
    }

    fn exit(&self) {
        log::info!("exit ve");
    }
}

type Rows = Rc<RefCell<Vec<ElementHandle<TodoRow>>>>;

fn registry() -> DelegateRegistry {
    let mut registry = DelegateRegistry::new();
    let badges = [
        ("", 0, "todo"),
        ("compact", 0, "t"),
        ("compact", 1, "T"),
    ];
    for (variant, priority, label) in badges {
        let template = Template::new(ContentKind::Html, move |renderer| {
            renderer.open("span", None);
            renderer.text(label);
            renderer.close();
        });
        if let Err(err) = registry.register("badge", variant, priority, template) {
            log::error!("{err}");
        }
    }
    registry
}

fn app(runtime: &TemplateRuntime, todos: &[Todo], rows: &Rows, renderer: &mut dyn Renderer) {
    rows.borrow_mut().clear();
    call!(renderer, |renderer| {
        renderer.open("header", None);
        runtime.call_delegate(renderer, "badge", "compact", None);
        let footer = TemplateValue::from(SanitizedContent::text(format!("{} items", todos.len())));
        print(renderer, &footer);
        renderer.close();
    });
    with_log_region(renderer, &VisualElement::new(1, "todo-list"), false, |renderer| {
        renderer.open("ul", None);
        for todo in todos {
            let key = KeySegment::from(todo.title.as_str());
            if let Some(row) = render_element(renderer, key, todo.clone(), TodoRow::default) {
                if row
                    .try_set_skip_handler(|previous, next| previous.data == next.data)
                    .is_ok()
                {
                    log::debug!("row {} skips unchanged data", row.key());
                }
                rows.borrow_mut().push(row);
            }
        }
        renderer.close();
    });
}

fn main() -> Result<(), PatchError> {
    env_logger::init();

    println!("=== Incremental DOM Demo ===");
    println!("Renders a keyed list twice and shows what the second pass touched.");
    println!();

    let runtime = TemplateRuntime::default()
        .with_registry(registry())
        .with_logger(Rc::new(ConsoleLogger));
    let mut patcher = MemoryPatcher::new();
    runtime.attach(&mut patcher);
    let root = patcher.root();
    let rows: Rows = Rc::default();

    let mut todos = vec![Todo::new("milk"), Todo::new("eggs"), Todo::new("bread")];
    runtime.patch_inner(&mut patcher, root, |renderer| {
        app(&runtime, &todos, &rows, renderer)
    })?;
    println!("{}", patcher.dump_tree(root));
    println!("first pass: {:?}", patcher.stats());

    todos.swap(0, 2);
    todos[1].done = true;
    patcher.reset_stats();
    runtime.patch_inner(&mut patcher, root, |renderer| {
        app(&runtime, &todos, &rows, renderer)
    })?;
    println!("{}", patcher.dump_tree(root));
    println!("second pass: {:?}", patcher.stats());

    for row in rows.borrow().iter() {
        let renders = row.with_element(|row| row.renders);
        println!("{} -> {:?}, rendered {renders} time(s)", row.key(), row.phase());
    }
    Ok(())
}
